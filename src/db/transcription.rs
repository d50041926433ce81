//! `Transcription` repository (§3: invariants T1, T2).

use super::models::{Segment, Status, Transcription};
use super::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

fn row_to_transcription(row: &rusqlite::Row) -> rusqlite::Result<Transcription> {
    let id: String = row.get(0)?;
    let media_file_id: String = row.get(1)?;
    let segments_json: String = row.get(4)?;
    let status: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(Transcription {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        media_file_id: Uuid::parse_str(&media_file_id).unwrap_or_default(),
        owner_id: row.get(2)?,
        full_text: row.get(3)?,
        segments: serde_json::from_str::<Vec<Segment>>(&segments_json).unwrap_or_default(),
        language: row.get(5)?,
        model_name: row.get(6)?,
        model_version: row.get(7)?,
        avg_confidence: row.get(8)?,
        processing_seconds: row.get(10)?,
        status: status.parse().unwrap_or(Status::Pending),
        error_text: row.get(13)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str = "id, media_file_id, owner_id, full_text, segments, language, \
    model_name, model_version, avg_confidence, status, processing_seconds, created_at, updated_at, error_text";

impl Db {
    pub fn insert_pending_transcription(&self, id: Uuid, media_file_id: Uuid, owner_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO transcriptions (id, media_file_id, owner_id, full_text, segments, \
             status, created_at, updated_at) VALUES (?1,?2,?3,'','[]',?4,?5,?5)",
            params![
                id.to_string(),
                media_file_id.to_string(),
                owner_id,
                Status::Pending.as_str(),
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_transcription(&self, id: Uuid) -> Result<Option<Transcription>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM transcriptions WHERE id = ?1"),
                params![id.to_string()],
                row_to_transcription,
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite the transcript result (idempotent on activity retry, §4.8).
    /// Enforces T1: non-empty `full_text` whenever `status=completed`.
    pub fn complete_transcription(
        &self,
        id: Uuid,
        full_text: &str,
        segments: &[Segment],
        language: Option<&str>,
        model_name: &str,
        model_version: Option<&str>,
        avg_confidence: Option<f32>,
        processing_seconds: f64,
    ) -> Result<()> {
        if full_text.trim().is_empty() {
            return Err(crate::error::PipelineError::Invariant(
                "transcription completed with empty full_text (T1)".to_string(),
            ));
        }
        let segments_json = serde_json::to_string(segments)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE transcriptions SET full_text = ?1, segments = ?2, language = ?3, \
             model_name = ?4, model_version = ?5, avg_confidence = ?6, processing_seconds = ?7, \
             status = ?8, error_text = NULL, updated_at = ?9 WHERE id = ?10",
            params![
                full_text,
                segments_json,
                language,
                model_name,
                model_version,
                avg_confidence,
                processing_seconds,
                Status::Completed.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Mark a transcription failed. Enforces T2.
    pub fn fail_transcription(&self, id: Uuid, error_text: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE transcriptions SET status = ?1, error_text = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                Status::Failed.as_str(),
                error_text,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn list_transcriptions_for_media_file(&self, media_file_id: Uuid) -> Result<Vec<Transcription>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM transcriptions WHERE media_file_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![media_file_id.to_string()], row_to_transcription)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MediaFile, Origin};
    use crate::error::PipelineError;

    /// Inserts a `MediaFile` row and returns its id, so callers have a real
    /// parent for `insert_pending_transcription`'s FK on `media_files(id)`.
    fn seed_media_file(db: &Db) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_media_file(&MediaFile {
            id,
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
        id
    }

    #[test]
    fn completing_with_empty_text_is_rejected() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        db.insert_pending_transcription(tid, seed_media_file(&db), "u1").unwrap();

        let err = db
            .complete_transcription(tid, "   ", &[], None, "whisper-small", None, None, 1.0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }

    #[test]
    fn complete_then_fail_updates_status() {
        let db = Db::in_memory().unwrap();
        let tid = Uuid::new_v4();
        db.insert_pending_transcription(tid, seed_media_file(&db), "u1").unwrap();
        db.complete_transcription(tid, "hello world", &[], None, "whisper-small", None, None, 1.0)
            .unwrap();
        let t = db.get_transcription(tid).unwrap().unwrap();
        assert_eq!(t.status, Status::Completed);

        db.fail_transcription(tid, "boom").unwrap();
        let t = db.get_transcription(tid).unwrap().unwrap();
        assert_eq!(t.status, Status::Failed);
        assert_eq!(t.error_text.as_deref(), Some("boom"));
    }
}
