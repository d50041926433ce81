//! `TranscribeWorkflow`: transcribe -> chunk -> assign topics -> embed (§4.8).
//!
//! Four sequential activities, each retried and timed out independently:
//! `transcribe_activity` (1h, 3 attempts), `chunk_activity` (30m, 2
//! attempts), `assign_topics_activity` (10m, 2 attempts), `embed_activity`
//! (10m, 3 attempts). Backoff is 1s-10s doubling for all four, matching
//! `ollama_service.py`'s own `wait_exponential(multiplier=1, min=1, max=10)`.

use super::{run_activity, Activity, Backoff};
use crate::chunker::{self, llm::LlmClient};
use crate::classifier;
use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{PipelineError, Result};
use crate::embedder;
use crate::progress::{fraction_to_percent, Event, ProgressBus};
use crate::transcriber::{self, TranscribeProgress};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

fn fast_backoff() -> Backoff {
    Backoff {
        initial: Duration::from_secs(1),
        max: Duration::from_secs(10),
        multiplier: 2.0,
    }
}

pub struct TranscribeActivity {
    pub db: Arc<Db>,
    pub transcription_id: Uuid,
    pub audio_path: PathBuf,
    pub models_dir: PathBuf,
    pub config: Arc<AppConfig>,
}

#[async_trait]
impl Activity for TranscribeActivity {
    type Output = ();

    fn name(&self) -> &'static str {
        "transcribe_activity"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn run(&self, job_id: Uuid, progress: &ProgressBus) -> Result<()> {
        let started = std::time::Instant::now();
        let progress_clone = progress.clone();
        let output = transcriber::transcribe(
            &self.audio_path,
            &self.models_dir,
            self.config.whisper_model_size,
            None,
            move |p: TranscribeProgress| {
                progress_clone.publish(job_id, Event::processing(Some(fraction_to_percent(p.fraction_done))));
            },
        )
        .await?;

        self.db.complete_transcription(
            self.transcription_id,
            &output.full_text,
            &output.segments,
            None,
            &format!("whisper-{}", self.config.whisper_model_size),
            None,
            output.avg_confidence.map(|c| c as f32),
            started.elapsed().as_secs_f64(),
        )
    }
}

pub struct ChunkActivity {
    pub db: Arc<Db>,
    pub transcription_id: Uuid,
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmClient>,
}

#[async_trait]
impl Activity for ChunkActivity {
    type Output = ();

    fn name(&self) -> &'static str {
        "chunk_activity"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn max_attempts(&self) -> u32 {
        2
    }

    async fn run(&self, job_id: Uuid, progress: &ProgressBus) -> Result<()> {
        let transcription = self
            .db
            .get_transcription(self.transcription_id)?
            .ok_or_else(|| PipelineError::Invariant(format!("transcription {} not found", self.transcription_id)))?;

        let mut on_heartbeat = || progress.publish(job_id, Event::processing(None));
        let chunks = chunker::chunk_transcript(
            self.transcription_id,
            &transcription.full_text,
            &transcription.segments,
            self.config.chunking_strategy,
            &self.config.chunk_sizing,
            &self.config.prompts.chunking,
            &self.llm,
            &mut on_heartbeat,
        )
        .await?;

        self.db.replace_chunks(self.transcription_id, &chunks)
    }
}

pub struct AssignTopicsActivity {
    pub db: Arc<Db>,
    pub transcription_id: Uuid,
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmClient>,
}

#[async_trait]
impl Activity for AssignTopicsActivity {
    type Output = ();

    fn name(&self) -> &'static str {
        "assign_topics_activity"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }

    fn max_attempts(&self) -> u32 {
        2
    }

    async fn run(&self, job_id: Uuid, progress: &ProgressBus) -> Result<()> {
        let mut on_heartbeat = || progress.publish(job_id, Event::processing(None));
        classifier::classify(
            &self.db,
            self.transcription_id,
            &self.config.prompts.classification,
            &self.llm,
            &mut on_heartbeat,
        )
        .await
        .map(|_| ())
    }
}

pub struct EmbedActivity {
    pub db: Arc<Db>,
    pub transcription_id: Uuid,
}

#[async_trait]
impl Activity for EmbedActivity {
    type Output = ();

    fn name(&self) -> &'static str {
        "embed_activity"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn run(&self, _job_id: Uuid, _progress: &ProgressBus) -> Result<()> {
        let chunks = self.db.list_chunks(self.transcription_id)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder::embed_batch(&texts)?;
        self.db.set_chunk_embeddings(self.transcription_id, &embeddings)
    }
}

/// Run transcribe -> chunk -> assign topics -> embed for `job_id` (§4.8).
#[instrument(skip(db, llm, progress, config))]
pub async fn run(
    db: Arc<Db>,
    llm: Arc<LlmClient>,
    config: Arc<AppConfig>,
    progress: ProgressBus,
    job_id: Uuid,
    transcription_id: Uuid,
    audio_path: PathBuf,
    models_dir: PathBuf,
) -> Result<()> {
    db.mark_processing(job_id)?;
    let backoff = fast_backoff();
    let heartbeat_interval = Duration::from_secs(config.heartbeat.interval_secs);

    let outcome: Result<()> = async {
        run_activity(
            &TranscribeActivity {
                db: db.clone(),
                transcription_id,
                audio_path,
                models_dir,
                config: config.clone(),
            },
            job_id,
            &progress,
            &backoff,
            heartbeat_interval,
        )
        .await?;

        run_activity(
            &ChunkActivity {
                db: db.clone(),
                transcription_id,
                config: config.clone(),
                llm: llm.clone(),
            },
            job_id,
            &progress,
            &backoff,
            heartbeat_interval,
        )
        .await?;

        run_activity(
            &AssignTopicsActivity {
                db: db.clone(),
                transcription_id,
                config: config.clone(),
                llm: llm.clone(),
            },
            job_id,
            &progress,
            &backoff,
            heartbeat_interval,
        )
        .await?;

        run_activity(
            &EmbedActivity {
                db: db.clone(),
                transcription_id,
            },
            job_id,
            &progress,
            &backoff,
            heartbeat_interval,
        )
        .await?;

        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            db.mark_completed(job_id, None)?;
            let transcript = db.get_transcription(transcription_id)?.map(|t| t.full_text);
            progress.publish(job_id, Event::completed(transcript));
            Ok(())
        }
        Err(e) => {
            db.fail_transcription(transcription_id, &e.to_string())?;
            db.mark_failed(job_id, &e.to_string())?;
            progress.publish(job_id, Event::failed(e.to_string()));
            Err(e)
        }
    }
}
