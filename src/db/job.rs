//! `Job` repository (§3; §8 invariant 5: terminal states are final).

use super::models::{Job, JobKind, Status};
use super::Db;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let media_file_id: Option<String> = row.get(5)?;
    let transcription_id: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Job {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        owner_id: row.get(1)?,
        kind: kind.parse().unwrap_or(JobKind::Download),
        status: status.parse().unwrap_or(Status::Pending),
        error_text: row.get(4)?,
        media_file_id: media_file_id.and_then(|s| Uuid::parse_str(&s).ok()),
        transcription_id: transcription_id.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str =
    "id, owner_id, kind, status, error_text, media_file_id, transcription_id, created_at, updated_at";

impl Db {
    pub fn create_job(&self, owner_id: &str, kind: JobKind, transcription_id: Option<Uuid>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (id, owner_id, kind, status, transcription_id, created_at, updated_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?6)",
            params![
                id.to_string(),
                owner_id,
                kind.as_str(),
                Status::Pending.as_str(),
                transcription_id.map(|t| t.to_string()),
                now,
            ],
        )?;
        Ok(id)
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.to_string()],
                row_to_job,
            )
            .optional()?;
        Ok(row)
    }

    fn set_status(&self, id: Uuid, status: Status, error_text: Option<&str>) -> Result<()> {
        let existing = self.get_job(id)?;
        if let Some(job) = &existing {
            if job.status.is_terminal() {
                return Err(PipelineError::Invariant(format!(
                    "job {id} is already terminal ({:?}); no further writes allowed",
                    job.status
                )));
            }
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = ?1, error_text = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error_text, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.set_status(id, Status::Processing, None)
    }

    pub fn mark_completed(&self, id: Uuid, media_file_id: Option<Uuid>) -> Result<()> {
        if let Some(mf) = media_file_id {
            let conn = self.lock();
            conn.execute(
                "UPDATE jobs SET media_file_id = ?1 WHERE id = ?2",
                params![mf.to_string(), id.to_string()],
            )?;
        }
        self.set_status(id, Status::Completed, None)
    }

    pub fn mark_failed(&self, id: Uuid, error_text: &str) -> Result<()> {
        self.set_status(id, Status::Failed, Some(error_text))
    }

    pub fn list_jobs(&self, owner_id: &str) -> Result<Vec<Job>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE owner_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![owner_id], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Jobs stuck in `processing` past `stale_after_secs` (operational tooling,
    /// not part of the durable-effect contract — see SPEC_FULL.md §B.5).
    pub fn list_stale_processing_jobs(&self, stale_after_secs: i64) -> Result<Vec<Job>> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(stale_after_secs)).to_rfc3339();
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE status = 'processing' AND updated_at < ?1"
        ))?;
        let rows = stmt.query_map(params![cutoff], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Fail every job stuck in `processing` past `stale_after_secs`. Job rows
    /// don't persist enough of their original request (source URL, model
    /// overrides) to safely re-run the activity chain, so this marks them
    /// failed rather than re-enqueuing them. Returns the number requeued.
    pub fn requeue_stuck(&self, stale_after_secs: i64) -> Result<usize> {
        let stale = self.list_stale_processing_jobs(stale_after_secs)?;
        for job in &stale {
            self.mark_failed(job.id, "stale: exceeded processing window without a heartbeat")?;
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_job_rejects_further_writes() {
        let db = Db::in_memory().unwrap();
        let id = db.create_job("u1", JobKind::Download, None).unwrap();
        db.mark_completed(id, None).unwrap();
        let err = db.mark_failed(id, "late error").unwrap_err();
        assert!(matches!(err, PipelineError::Invariant(_)));
    }

    #[test]
    fn lifecycle_transitions() {
        let db = Db::in_memory().unwrap();
        let id = db.create_job("u1", JobKind::Transcribe, None).unwrap();
        db.mark_processing(id).unwrap();
        db.mark_completed(id, None).unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, Status::Completed);
    }
}
