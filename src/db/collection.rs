//! `Collection` and `TranscriptionCollection` repository (§3).

use super::models::Collection;
use super::Db;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
    let id: String = row.get(0)?;
    let is_public: i32 = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Collection {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        owner_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        is_public: is_public != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl Db {
    pub fn create_collection(&self, owner_id: &str, name: &str, kind: Option<&str>, is_public: bool) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO collections (id, owner_id, name, kind, is_public, created_at, updated_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?6)",
            params![id.to_string(), owner_id, name, kind, is_public as i32, now],
        )?;
        Ok(id)
    }

    pub fn list_collections(&self, owner_id: &str) -> Result<Vec<Collection>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, kind, is_public, created_at, updated_at \
             FROM collections WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], row_to_collection)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn add_to_collection(
        &self,
        transcription_id: Uuid,
        collection_id: Uuid,
        position: Option<i32>,
        assigned_by: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO transcription_collections \
             (transcription_id, collection_id, position, assigned_by) VALUES (?1,?2,?3,?4)",
            params![
                transcription_id.to_string(),
                collection_id.to_string(),
                position,
                assigned_by,
            ],
        )?;
        Ok(())
    }

    pub fn list_collection_members(&self, collection_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT transcription_id FROM transcription_collections WHERE collection_id = ?1 \
             ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![collection_id.to_string()], |row| {
            let id: String = row.get(0)?;
            Ok(id)
        })?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_list_collection() {
        let db = Db::in_memory().unwrap();
        let id = db.create_collection("u1", "Lectures", Some("playlist"), false).unwrap();
        let collections = db.list_collections("u1").unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].id, id);
    }

    #[test]
    fn membership_is_idempotent() {
        let db = Db::in_memory().unwrap();
        let collection_id = db.create_collection("u1", "Lectures", None, false).unwrap();
        let transcription_id = Uuid::new_v4();
        db.add_to_collection(transcription_id, collection_id, Some(0), None).unwrap();
        db.add_to_collection(transcription_id, collection_id, Some(0), None).unwrap();
        assert_eq!(db.list_collection_members(collection_id).unwrap().len(), 1);
    }
}
