//! Thin HTTP API surface (§6 "API surface (collaborator)").
//!
//! Grounded on `cli/commands/serve.rs`'s `AppState`/CORS/router shape: a
//! shared `Arc<AppState>`, an `Any`-origin CORS layer, JSON in, JSON out. The
//! five handlers here are exactly §6's external-interface list; nothing
//! beyond them is exposed.

use crate::chunker::llm::LlmClient;
use crate::config::AppConfig;
use crate::content_store::ContentStore;
use crate::db::models::JobKind;
use crate::db::Db;
use crate::progress::ProgressBus;
use crate::{search, workflow};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse::Event as SseEvent, IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;
use uuid::Uuid;

pub struct AppState {
    pub db: Arc<Db>,
    pub content_store: Arc<ContentStore>,
    pub llm: Arc<LlmClient>,
    pub config: Arc<AppConfig>,
    pub progress: ProgressBus,
}

/// Build the router described by §6. Callers bind and serve it.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/jobs/download", post(create_download_job))
        .route("/transcriptions", post(create_transcription))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/progress", get(subscribe_progress))
        .route("/search", get(search_handler))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
}

#[derive(Debug, Deserialize)]
struct CreateDownloadJobRequest {
    owner: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct CreateDownloadJobResponse {
    job_id: Uuid,
}

/// `create_download_job(owner, url) -> job_id` (§6).
async fn create_download_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDownloadJobRequest>,
) -> impl IntoResponse {
    let job_id = match state.db.create_job(&req.owner, JobKind::Download, None) {
        Ok(id) => id,
        Err(e) => return internal_error(e).into_response(),
    };

    let db = state.db.clone();
    let content_store = state.content_store.clone();
    let progress = state.progress.clone();
    let work_dir = state.config.work_root();
    let owner = req.owner.clone();
    let url = req.url.clone();

    tokio::spawn(async move {
        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            error!(%e, "failed to create work dir");
            return;
        }
        if let Err(e) = workflow::download::run(db, content_store, progress.clone(), job_id, owner, url, work_dir).await
        {
            error!(%e, %job_id, "download workflow failed");
        }
        progress.retire(job_id).await;
    });

    Json(CreateDownloadJobResponse { job_id }).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateTranscriptionRequest {
    owner: String,
    media_file_id: Uuid,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTranscriptionResponse {
    job_id: Uuid,
    transcription_id: Uuid,
}

/// `create_transcription(owner, media_file_id, model?, language?) -> (job_id,
/// transcription_id)` (§6). `model`/`language` are accepted for wire
/// compatibility; the workflow selects the model from `WHISPER_MODEL_SIZE`
/// and auto-detects language, per §4.4.
async fn create_transcription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTranscriptionRequest>,
) -> impl IntoResponse {
    let _ = (&req.model, &req.language);

    let media_file = match state.db.get_media_file(req.media_file_id) {
        Ok(Some(m)) => m,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("media file {} not found", req.media_file_id),
                }),
            )
                .into_response()
        }
        Err(e) => return internal_error(e).into_response(),
    };

    let transcription_id = Uuid::new_v4();
    if let Err(e) = state
        .db
        .insert_pending_transcription(transcription_id, media_file.id, &req.owner)
    {
        return internal_error(e).into_response();
    }
    let job_id = match state.db.create_job(&req.owner, JobKind::Transcribe, Some(transcription_id)) {
        Ok(id) => id,
        Err(e) => return internal_error(e).into_response(),
    };

    let db = state.db.clone();
    let llm = state.llm.clone();
    let config = state.config.clone();
    let progress = state.progress.clone();
    let audio_path = std::path::PathBuf::from(&media_file.stored_path);
    let models_dir = state.config.models_root();

    tokio::spawn(async move {
        if let Err(e) = workflow::transcribe::run(
            db,
            llm,
            config,
            progress.clone(),
            job_id,
            transcription_id,
            audio_path,
            models_dir,
        )
        .await
        {
            error!(%e, %job_id, "transcribe workflow failed");
        }
        progress.retire(job_id).await;
    });

    Json(CreateTranscriptionResponse { job_id, transcription_id }).into_response()
}

/// `get_job(job_id) -> Job` (§6).
async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> impl IntoResponse {
    match state.db.get_job(job_id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("job {job_id} not found"),
            }),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// `subscribe_progress(job_id) -> stream<Event>` (§6), served as SSE. The
/// stream ends when `ProgressBus::retire` tears down the channel a few
/// seconds after the terminal event; lagged deliveries are dropped rather
/// than failing the connection.
async fn subscribe_progress(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.progress.subscribe(job_id);
    let stream = BroadcastStream::new(rx).filter_map(|item| async move {
        let event = item.ok()?;
        let json = serde_json::to_string(&event).unwrap_or_default();
        Some(Ok(SseEvent::default().data(json)))
    });
    Sse::new(stream)
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    owner: String,
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

/// `search(owner, query, limit) -> [Hit]` (§6, §4.10).
async fn search_handler(State(state): State<Arc<AppState>>, Query(q): Query<SearchQuery>) -> impl IntoResponse {
    match search::search(&state.db, &q.owner, &q.query, q.limit) {
        Ok(hits) => Json(hits).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
