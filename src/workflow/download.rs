//! `DownloadWorkflow`: fetch a remote URL into the content store (§4.8).
//!
//! A single activity, `download_activity`: 30 minute timeout, 3 attempts,
//! 5s-60s doubling backoff.

use super::{run_activity, Activity, Backoff};
use crate::content_store::ContentStore;
use crate::db::models::{MediaFile, Origin};
use crate::db::Db;
use crate::error::Result;
use crate::fetcher::{self, FetchProgress};
use crate::progress::{fraction_to_percent, Event, ProgressBus};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

pub struct DownloadActivity {
    pub db: Arc<Db>,
    pub content_store: Arc<ContentStore>,
    pub owner_id: String,
    pub source_url: String,
    pub work_dir: PathBuf,
}

#[async_trait]
impl Activity for DownloadActivity {
    type Output = MediaFile;

    fn name(&self) -> &'static str {
        "download_activity"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn run(&self, job_id: Uuid, progress: &ProgressBus) -> Result<MediaFile> {
        let progress = progress.clone();
        let output = fetcher::fetch(&self.source_url, &self.work_dir, move |p| {
            let FetchProgress::Bytes { done, total } = p;
            let progress_pct = total.map(|t| fraction_to_percent(if t == 0 { 0.0 } else { done as f64 / t as f64 }));
            progress.publish(job_id, Event::processing(progress_pct));
        })
        .await?;

        let staged = self.content_store.stage(&std::fs::read(&output.downloaded_path)?)?;
        let _ = std::fs::remove_file(&output.downloaded_path);

        let result = self.content_store.ingest(
            &self.db,
            &self.owner_id,
            &output.display_name,
            &staged,
            Origin::Download,
            Some(&self.source_url),
            Some(&output.platform),
        )?;
        Ok(result.media_file)
    }
}

/// Run the download workflow for `job_id`, updating job status and emitting
/// a terminal progress event on completion or failure (§4.8).
#[instrument(skip(db, content_store, progress))]
pub async fn run(
    db: Arc<Db>,
    content_store: Arc<ContentStore>,
    progress: ProgressBus,
    job_id: Uuid,
    owner_id: String,
    source_url: String,
    work_dir: PathBuf,
) -> Result<MediaFile> {
    db.mark_processing(job_id)?;

    let activity = DownloadActivity {
        db: db.clone(),
        content_store,
        owner_id,
        source_url,
        work_dir,
    };
    let backoff = Backoff {
        initial: Duration::from_secs(5),
        max: Duration::from_secs(60),
        multiplier: 2.0,
    };

    match run_activity(&activity, job_id, &progress, &backoff, Duration::from_secs(5)).await {
        Ok(media_file) => {
            db.mark_completed(job_id, Some(media_file.id))?;
            progress.publish(job_id, Event::completed(None));
            Ok(media_file)
        }
        Err(e) => {
            db.mark_failed(job_id, &e.to_string())?;
            progress.publish(job_id, Event::failed(e.to_string()));
            Err(e)
        }
    }
}
