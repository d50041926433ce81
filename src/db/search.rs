//! Candidate retrieval for semantic search (C10).
//!
//! Pulls every embedded chunk owned by a user out of completed transcriptions
//! whose media file still exists. Ranking itself (cosine distance, top-K) is
//! plain application code in `crate::search` — see that module's doc comment
//! for why there is no ANN index here.

use super::Db;
use crate::error::Result;
use rusqlite::params;
use uuid::Uuid;

/// One searchable unit: a chunk plus the identifiers a caller needs to
/// resolve it back to a transcription/media file.
pub struct SearchCandidate {
    pub chunk_id: Uuid,
    pub transcription_id: Uuid,
    pub media_file_id: Uuid,
    pub text: String,
    pub start_s: Option<f64>,
    pub end_s: Option<f64>,
    pub embedding: Vec<f32>,
}

impl Db {
    /// All embedded chunks under `owner_id` whose transcription is `completed`.
    pub fn list_search_candidates(&self, owner_id: &str) -> Result<Vec<SearchCandidate>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.transcription_id, t.media_file_id, c.text, c.start_s, c.end_s, c.embedding \
             FROM chunks c \
             JOIN transcriptions t ON t.id = c.transcription_id \
             WHERE t.owner_id = ?1 AND t.status = 'completed' AND c.embedding IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            let chunk_id: String = row.get(0)?;
            let transcription_id: String = row.get(1)?;
            let media_file_id: String = row.get(2)?;
            let embedding_bytes: Vec<u8> = row.get(6)?;
            Ok((
                chunk_id,
                transcription_id,
                media_file_id,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                embedding_bytes,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (chunk_id, transcription_id, media_file_id, text, start_s, end_s, embedding_bytes) = row?;
            out.push(SearchCandidate {
                chunk_id: Uuid::parse_str(&chunk_id).unwrap_or_default(),
                transcription_id: Uuid::parse_str(&transcription_id).unwrap_or_default(),
                media_file_id: Uuid::parse_str(&media_file_id).unwrap_or_default(),
                text,
                start_s,
                end_s,
                embedding: super::chunk::bytes_to_embedding(&embedding_bytes),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Chunk, Origin};

    #[test]
    fn only_completed_embedded_chunks_are_candidates() {
        let db = Db::in_memory().unwrap();
        let media_file_id = Uuid::new_v4();
        db.insert_media_file(&crate::db::models::MediaFile {
            id: media_file_id,
            owner_id: "u1".into(),
            stored_path: "/tmp/x.mp3".into(),
            display_name: "x.mp3".into(),
            byte_size: 10,
            mime: None,
            duration_seconds: None,
            content_hash: "abc".into(),
            origin: Origin::Upload,
            origin_url: None,
            origin_platform: None,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
        let transcription_id = Uuid::new_v4();
        db.insert_pending_transcription(transcription_id, media_file_id, "u1")
            .unwrap();
        db.complete_transcription(
            transcription_id,
            "hello world",
            &[],
            None,
            "whisper-small",
            None,
            None,
            1.0,
        )
        .unwrap();
        db.replace_chunks(
            transcription_id,
            &[Chunk {
                id: Uuid::new_v4(),
                transcription_id,
                chunk_index: 0,
                text: "hello world".into(),
                start_s: Some(0.0),
                end_s: Some(1.0),
                start_char: Some(0),
                end_char: Some(11),
                topic_summary: None,
                keywords: None,
                confidence: None,
                embedding: None,
            }],
        )
        .unwrap();

        assert!(db.list_search_candidates("u1").unwrap().is_empty());

        db.set_chunk_embeddings(transcription_id, &[vec![1.0, 0.0, 0.0]]).unwrap();
        let candidates = db.list_search_candidates("u1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].media_file_id, media_file_id);
    }
}
