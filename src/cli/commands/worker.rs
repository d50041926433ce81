//! Workflow supervisor (§A "CLI surface").
//!
//! `serve` dispatches each job's activity chain in-process as soon as it's
//! created (see `api::create_download_job` / `api::create_transcription`);
//! there's no external queue for this worker to drain. What it owns instead
//! is the maintenance loop: reseed the reserved `Unknown` topic, sweep
//! abandoned content-store staging files, and fail jobs that have been stuck
//! in `processing` past a staleness window (SPEC_FULL.md §B.4, §B.5).

use crate::cli::Output;
use crate::config::AppConfig;
use crate::content_store::ContentStore;
use crate::db::Db;
use tracing::{info, warn};

pub async fn run_worker(stale_after_secs: i64, interval_secs: u64, config: AppConfig) -> anyhow::Result<()> {
    let db = Db::open(&std::path::PathBuf::from(&config.database_url))?;
    let store = ContentStore::new(config.upload_root());

    let topic_id = db.seed_default_topics()?;
    info!(%topic_id, "default topics seeded");

    Output::header("Workflow supervisor");
    Output::kv("Stale-after", &format!("{stale_after_secs}s"));
    Output::kv("Sweep interval", &format!("{interval_secs}s"));
    Output::info("Press Ctrl+C to stop.");

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;

        match store.sweep_staging(interval_secs.max(3600)) {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "swept abandoned staging files"),
            Err(e) => warn!(%e, "staging sweep failed"),
        }

        match db.requeue_stuck(stale_after_secs) {
            Ok(0) => {}
            Ok(n) => warn!(count = n, "failed stale jobs stuck in processing"),
            Err(e) => warn!(%e, "stale job sweep failed"),
        }
    }
}
