//! `Topic` taxonomy and `TranscriptionTopic` assignment repository (§3: P1, P2).

use super::models::{Topic, TranscriptionTopic, UNKNOWN_TOPIC_NAME};
use super::Db;
use crate::error::{PipelineError, Result};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

fn row_to_topic(row: &rusqlite::Row) -> rusqlite::Result<Topic> {
    let id: String = row.get(0)?;
    let parent_id: Option<String> = row.get(3)?;
    Ok(Topic {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: parent_id.and_then(|p| Uuid::parse_str(&p).ok()),
    })
}

impl Db {
    /// Ensure the reserved `Unknown` topic exists (P2). Idempotent; run at
    /// worker startup.
    pub fn seed_default_topics(&self) -> Result<Uuid> {
        if let Some(topic) = self.find_topic_by_name(UNKNOWN_TOPIC_NAME)? {
            return Ok(topic.id);
        }
        let id = Uuid::new_v4();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO topics (id, name, description, parent_id) VALUES (?1, ?2, NULL, NULL)",
            params![id.to_string(), UNKNOWN_TOPIC_NAME],
        )?;
        Ok(id)
    }

    pub fn find_topic_by_name(&self, name: &str) -> Result<Option<Topic>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, name, description, parent_id FROM topics WHERE name = ?1 COLLATE NOCASE",
                params![name],
                row_to_topic,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, name, description, parent_id FROM topics ORDER BY name")?;
        let rows = stmt.query_map([], row_to_topic)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn create_topic(&self, name: &str, description: Option<&str>, parent_id: Option<Uuid>) -> Result<Uuid> {
        if let Some(parent) = parent_id {
            if self.get_topic(parent)?.is_none() {
                return Err(PipelineError::Input(format!("parent topic {parent} does not exist")));
            }
        }
        let id = Uuid::new_v4();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO topics (id, name, description, parent_id) VALUES (?1,?2,?3,?4)",
            params![
                id.to_string(),
                name,
                description,
                parent_id.map(|p| p.to_string()),
            ],
        )?;
        Ok(id)
    }

    pub fn get_topic(&self, id: Uuid) -> Result<Option<Topic>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, name, description, parent_id FROM topics WHERE id = ?1",
                params![id.to_string()],
                row_to_topic,
            )
            .optional()?;
        Ok(row)
    }

    /// Would setting `node`'s parent to `new_parent` create a cycle? Walks up
    /// from `new_parent` looking for `node` (§9's reachability check, P1).
    pub fn would_cycle(&self, node: Uuid, new_parent: Uuid) -> Result<bool> {
        let mut current = Some(new_parent);
        while let Some(id) = current {
            if id == node {
                return Ok(true);
            }
            current = self.get_topic(id)?.and_then(|t| t.parent_id);
        }
        Ok(false)
    }

    pub fn set_topic_parent(&self, node: Uuid, new_parent: Option<Uuid>) -> Result<()> {
        if let Some(parent) = new_parent {
            if self.would_cycle(node, parent)? {
                return Err(PipelineError::Invariant(format!(
                    "setting parent of {node} to {parent} would create a cycle (P1)"
                )));
            }
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE topics SET parent_id = ?1 WHERE id = ?2",
            params![new_parent.map(|p| p.to_string()), node.to_string()],
        )?;
        Ok(())
    }

    /// Persist topic assignments for a transcription, skipping existing links
    /// (idempotent, §4.7 step 8).
    pub fn assign_topics(
        &self,
        transcription_id: Uuid,
        assignments: &[TranscriptionTopic],
    ) -> Result<()> {
        let conn = self.lock();
        for a in assignments {
            conn.execute(
                "INSERT OR IGNORE INTO transcription_topics \
                 (transcription_id, topic_id, ai_confidence, ai_reasoning, assigned_by, user_reviewed) \
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    transcription_id.to_string(),
                    a.topic_id.to_string(),
                    a.ai_confidence,
                    a.ai_reasoning,
                    a.assigned_by,
                    a.user_reviewed as i32,
                ],
            )?;
        }
        Ok(())
    }

    pub fn list_transcription_topics(&self, transcription_id: Uuid) -> Result<Vec<TranscriptionTopic>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT transcription_id, topic_id, ai_confidence, ai_reasoning, assigned_by, user_reviewed \
             FROM transcription_topics WHERE transcription_id = ?1",
        )?;
        let rows = stmt.query_map(params![transcription_id.to_string()], |row| {
            let tid: String = row.get(0)?;
            let topic_id: String = row.get(1)?;
            let reviewed: i32 = row.get(5)?;
            Ok(TranscriptionTopic {
                transcription_id: Uuid::parse_str(&tid).unwrap_or_default(),
                topic_id: Uuid::parse_str(&topic_id).unwrap_or_default(),
                ai_confidence: row.get(2)?,
                ai_reasoning: row.get(3)?,
                assigned_by: row.get(4)?,
                user_reviewed: reviewed != 0,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let db = Db::in_memory().unwrap();
        let id1 = db.seed_default_topics().unwrap();
        let id2 = db.seed_default_topics().unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn cycle_is_rejected() {
        let db = Db::in_memory().unwrap();
        let a = db.create_topic("A", None, None).unwrap();
        let b = db.create_topic("B", None, Some(a)).unwrap();
        let err = db.set_topic_parent(a, Some(b)).unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }

    #[test]
    fn assign_topics_is_idempotent() {
        let db = Db::in_memory().unwrap();
        let topic_id = db.seed_default_topics().unwrap();
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
            origin: crate::db::models::Origin::Upload,
            origin_url: None,
            origin_platform: None,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
        let tid = Uuid::new_v4();
        db.insert_pending_transcription(tid, media_file_id, "u1").unwrap();
        let assignment = TranscriptionTopic {
            transcription_id: tid,
            topic_id,
            ai_confidence: None,
            ai_reasoning: Some("assigned by LLM from chunk summaries".to_string()),
            assigned_by: None,
            user_reviewed: false,
        };
        db.assign_topics(tid, &[assignment.clone()]).unwrap();
        db.assign_topics(tid, &[assignment]).unwrap();
        assert_eq!(db.list_transcription_topics(tid).unwrap().len(), 1);
    }
}
