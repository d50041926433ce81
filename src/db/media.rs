//! `MediaFile` repository (§3, §4.1).

use super::models::{MediaFile, Origin};
use super::Db;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

fn row_to_media_file(row: &rusqlite::Row) -> rusqlite::Result<MediaFile> {
    let id: String = row.get(0)?;
    let origin: String = row.get(8)?;
    let created_at: String = row.get(11)?;
    Ok(MediaFile {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        owner_id: row.get(1)?,
        stored_path: row.get(2)?,
        display_name: row.get(3)?,
        byte_size: row.get(4)?,
        mime: row.get(5)?,
        duration_seconds: row.get(6)?,
        content_hash: row.get(7)?,
        origin: origin.parse().unwrap_or(Origin::Upload),
        origin_url: row.get(9)?,
        origin_platform: row.get(10)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str = "id, owner_id, stored_path, display_name, byte_size, mime, \
    duration_seconds, content_hash, origin, origin_url, origin_platform, created_at";

impl Db {
    /// Insert a new `MediaFile` row. Callers must have already checked for an
    /// existing `(owner_id, content_hash)` row; a unique-constraint violation
    /// here surfaces as `PipelineError::Integrity` so the caller can re-check
    /// and fall back to the existing row (race handling, §4.1 step 5).
    pub fn insert_media_file(&self, file: &MediaFile) -> Result<()> {
        let conn = self.lock();
        let result = conn.execute(
            &format!(
                "INSERT INTO media_files ({SELECT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)"
            ),
            params![
                file.id.to_string(),
                file.owner_id,
                file.stored_path,
                file.display_name,
                file.byte_size,
                file.mime,
                file.duration_seconds,
                file.content_hash,
                file.origin.as_str(),
                file.origin_url,
                file.origin_platform,
                file.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(PipelineError::Integrity(format!(
                    "media file already exists for owner {} with hash {}",
                    file.owner_id, file.content_hash
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_media_file_by_hash(&self, owner_id: &str, content_hash: &str) -> Result<Option<MediaFile>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM media_files WHERE owner_id = ?1 AND content_hash = ?2"
                ),
                params![owner_id, content_hash],
                row_to_media_file,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_media_file(&self, id: Uuid) -> Result<Option<MediaFile>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM media_files WHERE id = ?1"),
                params![id.to_string()],
                row_to_media_file,
            )
            .optional()?;
        Ok(row)
    }

    /// Delete the DB row (cascading to transcriptions/chunks/links). The caller
    /// is responsible for unlinking the on-disk blob after this succeeds (§4.1:
    /// DB row deletion and filesystem unlink are ordered, DB first).
    pub fn delete_media_file(&self, id: Uuid) -> Result<Option<String>> {
        let conn = self.lock();
        let stored_path: Option<String> = conn
            .query_row(
                "SELECT stored_path FROM media_files WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if stored_path.is_some() {
            conn.execute("DELETE FROM media_files WHERE id = ?1", params![id.to_string()])?;
        }
        Ok(stored_path)
    }

    pub fn list_media_files(&self, owner_id: &str) -> Result<Vec<MediaFile>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM media_files WHERE owner_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![owner_id], row_to_media_file)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(owner: &str, hash: &str) -> MediaFile {
        MediaFile {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            stored_path: "uploads/user_u1/2026/07/abc_file.mp3".to_string(),
            display_name: "file.mp3".to_string(),
            byte_size: 1024,
            mime: Some("audio/mpeg".to_string()),
            duration_seconds: Some(60.0),
            content_hash: hash.to_string(),
            origin: Origin::Upload,
            origin_url: None,
            origin_platform: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_by_owner_and_hash() {
        let db = Db::in_memory().unwrap();
        let f = sample("u1", "hash1");
        db.insert_media_file(&f).unwrap();

        let found = db.find_media_file_by_hash("u1", "hash1").unwrap().unwrap();
        assert_eq!(found.id, f.id);

        let dup = sample("u1", "hash1");
        let err = db.insert_media_file(&dup).unwrap_err();
        assert!(matches!(err, PipelineError::Integrity(_)));
    }

    #[test]
    fn delete_removes_row_and_returns_path() {
        let db = Db::in_memory().unwrap();
        let f = sample("u1", "hash2");
        db.insert_media_file(&f).unwrap();

        let path = db.delete_media_file(f.id).unwrap();
        assert_eq!(path.as_deref(), Some(f.stored_path.as_str()));
        assert!(db.get_media_file(f.id).unwrap().is_none());
    }
}
