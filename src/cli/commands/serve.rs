//! HTTP API server (§6 "API surface (collaborator)").

use crate::api::{self, AppState};
use crate::chunker::llm::LlmClient;
use crate::cli::Output;
use crate::config::AppConfig;
use crate::content_store::ContentStore;
use crate::db::Db;
use crate::progress::ProgressBus;
use std::sync::Arc;

pub async fn run_serve(host: &str, port: u16, config: AppConfig) -> anyhow::Result<()> {
    let db = Arc::new(Db::open(&std::path::PathBuf::from(&config.database_url))?);
    db.seed_default_topics()?;

    let content_store = Arc::new(ContentStore::new(config.upload_root()));
    let llm = Arc::new(LlmClient::new(config.llm.clone())?);
    let config = Arc::new(config);

    let state = Arc::new(AppState {
        db,
        content_store,
        llm,
        config,
        progress: ProgressBus::new(),
    });

    let app = api::router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Media ingestion API");
    println!();
    Output::success(&format!("Listening on http://{addr}"));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Create download job", "POST /jobs/download");
    Output::kv("Create transcription", "POST /transcriptions");
    Output::kv("Get job", "GET  /jobs/:job_id");
    Output::kv("Subscribe to progress", "GET  /jobs/:job_id/progress");
    Output::kv("Search", "GET  /search");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}
