//! `Chunk` repository (§3: invariants K1, K2, K3).

use super::models::Chunk;
use super::Db;
use crate::error::{PipelineError, Result};
use rusqlite::params;
use uuid::Uuid;

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let id: String = row.get(0)?;
    let transcription_id: String = row.get(1)?;
    let keywords_json: Option<String> = row.get(8)?;
    let embedding_bytes: Option<Vec<u8>> = row.get(9)?;
    Ok(Chunk {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        transcription_id: Uuid::parse_str(&transcription_id).unwrap_or_default(),
        chunk_index: row.get(2)?,
        text: row.get(3)?,
        start_s: row.get(4)?,
        end_s: row.get(5)?,
        start_char: row.get(6)?,
        end_char: row.get(7)?,
        topic_summary: row.get(10)?,
        keywords: keywords_json.and_then(|j| serde_json::from_str(&j).ok()),
        confidence: row.get(11)?,
        embedding: embedding_bytes.map(|b| bytes_to_embedding(&b)),
    })
}

const SELECT_COLUMNS: &str = "id, transcription_id, chunk_index, text, start_s, end_s, \
    start_char, end_char, keywords, embedding, topic_summary, confidence";

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(super) fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

impl Db {
    /// Replace all chunks for a transcription in one transaction. Deleting
    /// existing chunks before writing is what makes the chunking activity
    /// idempotent on retry (§4.8, §4.5 "must first DELETE all chunks").
    /// Validates K1 (dense 0..N-1 index) and K2 (contiguous, non-overlapping
    /// character coverage) before committing.
    pub fn replace_chunks(&self, transcription_id: Uuid, chunks: &[Chunk]) -> Result<()> {
        validate_chunk_indices(chunks)?;
        validate_char_coverage(chunks)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE transcription_id = ?1",
            params![transcription_id.to_string()],
        )?;
        for chunk in chunks {
            let keywords_json = chunk
                .keywords
                .as_ref()
                .map(|k| serde_json::to_string(k))
                .transpose()?;
            let embedding_bytes = chunk.embedding.as_ref().map(|e| embedding_to_bytes(e));
            tx.execute(
                "INSERT INTO chunks (id, transcription_id, chunk_index, text, start_s, end_s, \
                 start_char, end_char, topic_summary, keywords, confidence, embedding) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![
                    chunk.id.to_string(),
                    transcription_id.to_string(),
                    chunk.chunk_index,
                    chunk.text,
                    chunk.start_s,
                    chunk.end_s,
                    chunk.start_char,
                    chunk.end_char,
                    chunk.topic_summary,
                    keywords_json,
                    chunk.confidence,
                    embedding_bytes,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_chunks(&self, transcription_id: Uuid) -> Result<Vec<Chunk>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM chunks WHERE transcription_id = ?1 ORDER BY chunk_index"
        ))?;
        let rows = stmt.query_map(params![transcription_id.to_string()], row_to_chunk)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Write back embeddings for a transcription's chunks in index order, one
    /// transaction (§4.6).
    pub fn set_chunk_embeddings(&self, transcription_id: Uuid, embeddings: &[Vec<f32>]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut stmt = tx.prepare(
            "SELECT id FROM chunks WHERE transcription_id = ?1 ORDER BY chunk_index",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![transcription_id.to_string()], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        if ids.len() != embeddings.len() {
            return Err(PipelineError::Invariant(format!(
                "embedding count {} does not match chunk count {} for transcription {}",
                embeddings.len(),
                ids.len(),
                transcription_id
            )));
        }

        for (id, embedding) in ids.iter().zip(embeddings.iter()) {
            tx.execute(
                "UPDATE chunks SET embedding = ?1 WHERE id = ?2",
                params![embedding_to_bytes(embedding), id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn validate_chunk_indices(chunks: &[Chunk]) -> Result<()> {
    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.chunk_index != expected as i32 {
            return Err(PipelineError::Invariant(format!(
                "chunk_index {} at position {} breaks density (K1)",
                chunk.chunk_index, expected
            )));
        }
    }
    Ok(())
}

fn validate_char_coverage(chunks: &[Chunk]) -> Result<()> {
    let mut expected_start: Option<i64> = None;
    for chunk in chunks {
        let (Some(start), Some(end)) = (chunk.start_char, chunk.end_char) else {
            continue;
        };
        if start > end {
            return Err(PipelineError::Invariant(format!(
                "chunk {} has start_char {} > end_char {} (K2)",
                chunk.chunk_index, start, end
            )));
        }
        if let Some(expected) = expected_start {
            if start != expected {
                return Err(PipelineError::Invariant(format!(
                    "chunk {} starts at {} but previous chunk ended at {} (K2 gap/overlap)",
                    chunk.chunk_index, start, expected
                )));
            }
        }
        expected_start = Some(end);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MediaFile, Origin};

    /// Inserts a `MediaFile` + pending `Transcription` so `tid` satisfies the
    /// FK chain chunks require (`chunks.transcription_id -> transcriptions.id
    /// -> media_files.id`).
    fn seed_transcription(db: &Db, tid: Uuid) {
        let media_file_id = Uuid::new_v4();
        db.insert_media_file(&MediaFile {
            id: media_file_id,
            owner_id: "u1".into(),
            stored_path: "/tmp/x.mp3".into(),
            display_name: "x.mp3".into(),
            byte_size: 10,
            mime: None,
            duration_seconds: None,
            content_hash: Uuid::new_v4().to_string(),
            origin: Origin::Upload,
            origin_url: None,
            origin_platform: None,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
        db.insert_pending_transcription(tid, media_file_id, "u1").unwrap();
    }

    fn chunk(transcription_id: Uuid, index: i32, start: i64, end: i64) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            transcription_id,
            chunk_index: index,
            text: format!("chunk {index}"),
            start_s: None,
            end_s: None,
            start_char: Some(start),
            end_char: Some(end),
            topic_summary: None,
            keywords: None,
            confidence: None,
            embedding: None,
        }
    }

    #[test]
    fn replace_chunks_round_trips() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        seed_transcription(&db, tid);
        let chunks = vec![chunk(tid, 0, 0, 10), chunk(tid, 1, 10, 20)];
        db.replace_chunks(tid, &chunks).unwrap();

        let loaded = db.list_chunks(tid).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].chunk_index, 0);
        assert_eq!(loaded[1].start_char, Some(10));
    }

    #[test]
    fn retry_deletes_previous_chunks() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        seed_transcription(&db, tid);
        db.replace_chunks(tid, &[chunk(tid, 0, 0, 30)]).unwrap();
        db.replace_chunks(tid, &[chunk(tid, 0, 0, 15), chunk(tid, 1, 15, 30)])
            .unwrap();

        let loaded = db.list_chunks(tid).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn gap_in_coverage_is_rejected() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        let chunks = vec![chunk(tid, 0, 0, 10), chunk(tid, 1, 15, 20)];
        let err = db.replace_chunks(tid, &chunks).unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }

    #[test]
    fn non_dense_index_is_rejected() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        let chunks = vec![chunk(tid, 0, 0, 10), chunk(tid, 2, 10, 20)];
        let err = db.replace_chunks(tid, &chunks).unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }

    #[test]
    fn set_embeddings_mismatched_count_errors() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        seed_transcription(&db, tid);
        db.replace_chunks(tid, &[chunk(tid, 0, 0, 10)]).unwrap();
        let err = db.set_chunk_embeddings(tid, &[vec![1.0], vec![2.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }
}
