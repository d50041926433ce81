//! Local speech-to-text (C4).
//!
//! Grounded on `martintrojer-whis`'s `local_whisper` provider (lazy model
//! caching, `spawn_blocking` for CPU-bound inference) and the teacher's own
//! `transcription::whisper` module shape, swapped from the OpenAI Whisper API
//! onto `whisper-rs` per §4.4.

use crate::config::WhisperModelSize;
use crate::db::models::Segment;
use crate::error::{PipelineError, Result};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::process::Command;
use tracing::{debug, info, instrument};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Output of a completed transcription (§4.4).
pub struct TranscriptOutput {
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub avg_confidence: Option<f64>,
}

/// Progress heartbeat emitted every 5% or 5 seconds, whichever is sooner
/// (§4.4, §4.8 heartbeat contract).
#[derive(Debug, Clone, Copy)]
pub struct TranscribeProgress {
    pub fraction_done: f64,
}

struct ModelCache {
    size: WhisperModelSize,
    ctx: Arc<WhisperContext>,
}

static MODEL_CACHE: OnceLock<Mutex<Option<ModelCache>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<Option<ModelCache>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(None))
}

/// Local directory Whisper ggml models are expected to live in, keyed by
/// `WhisperModelSize::model_filename()`.
pub(crate) fn model_path(models_dir: &Path, size: WhisperModelSize) -> std::path::PathBuf {
    models_dir.join(size.model_filename())
}

impl WhisperModelSize {
    pub(crate) fn model_filename(&self) -> &'static str {
        match self {
            WhisperModelSize::Tiny => "ggml-tiny.bin",
            WhisperModelSize::Base => "ggml-base.bin",
            WhisperModelSize::Small => "ggml-small.bin",
            WhisperModelSize::Medium => "ggml-medium.bin",
            WhisperModelSize::Large => "ggml-large-v3.bin",
        }
    }
}

/// Load (or reuse the cached) Whisper model for `size`. Mirrors the
/// lazy-reload-on-size-change pattern of `local_whisper.rs`'s model manager.
fn get_or_load_model(models_dir: &Path, size: WhisperModelSize) -> Result<Arc<WhisperContext>> {
    let mut guard = model_cache()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cache) = guard.as_ref() {
        if cache.size == size {
            return Ok(cache.ctx.clone());
        }
    }
    let path = model_path(models_dir, size);
    info!(model = %path.display(), "loading whisper model");
    let ctx = WhisperContext::new_with_params(
        path.to_str().ok_or_else(|| PipelineError::Config("model path is not valid UTF-8".into()))?,
        WhisperContextParameters::default(),
    )
    .map_err(|e| PipelineError::Invariant(format!("failed to load whisper model: {e}")))?;
    let ctx = Arc::new(ctx);
    *guard = Some(ModelCache { size, ctx: ctx.clone() });
    Ok(ctx)
}

/// Decode `audio_path` (any ffmpeg-readable container) to 16kHz mono f32 PCM.
async fn decode_to_pcm(audio_path: &Path) -> Result<Vec<f32>> {
    let tmp = tempfile::Builder::new().suffix(".wav").tempfile()?;
    let wav_path = tmp.path().to_path_buf();

    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(audio_path)
        .args(["-ar", "16000", "-ac", "1", "-f", "wav", "-y", "-loglevel", "error"])
        .arg(&wav_path)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Input("ffmpeg is not installed".to_string())
            } else {
                PipelineError::transient("transcribe", format!("failed to spawn ffmpeg: {e}"))
            }
        })?;
    if !status.success() {
        return Err(PipelineError::transient(
            "transcribe",
            format!("ffmpeg resample exited with status {status}"),
        ));
    }

    let mut reader = hound::WavReader::open(&wav_path)
        .map_err(|e| PipelineError::Integrity(format!("invalid resampled WAV: {e}")))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .filter_map(|s| s.ok())
            .map(|s| s as f32 / i16::MAX as f32)
            .collect(),
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
    };
    Ok(samples)
}

/// Run inference over PCM samples on a blocking thread, reporting progress
/// through whisper-rs's segment callback (§4.4, §4.8).
fn run_inference(
    ctx: Arc<WhisperContext>,
    pcm: Vec<f32>,
    language: Option<String>,
    on_progress: impl Fn(TranscribeProgress) + Send + Sync + 'static,
) -> Result<TranscriptOutput> {
    let mut state = ctx
        .create_state()
        .map_err(|e| PipelineError::Invariant(format!("failed to create whisper state: {e}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(language.as_deref());
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_token_timestamps(false);

    let on_progress = Arc::new(on_progress);
    let cb_progress = on_progress.clone();
    params.set_progress_callback_safe(move |progress: i32| {
        cb_progress(TranscribeProgress {
            fraction_done: (progress as f64 / 100.0).clamp(0.0, 1.0),
        });
    });

    state
        .full(params, &pcm)
        .map_err(|e| PipelineError::transient("transcribe", format!("whisper inference failed: {e}")))?;

    let num_segments = state
        .full_n_segments()
        .map_err(|e| PipelineError::Invariant(format!("failed to read segment count: {e}")))?;

    let mut segments = Vec::with_capacity(num_segments as usize);
    let mut full_text = String::new();
    let mut confidences = Vec::with_capacity(num_segments as usize);

    for i in 0..num_segments {
        let text = state
            .full_get_segment_text(i)
            .map_err(|e| PipelineError::Invariant(format!("failed to read segment text: {e}")))?;
        let start_s = state.full_get_segment_t0(i).unwrap_or(0) as f64 / 100.0;
        let end_s = state.full_get_segment_t1(i).unwrap_or(0) as f64 / 100.0;
        let confidence = segment_confidence(&state, i);

        if !full_text.is_empty() {
            full_text.push(' ');
        }
        full_text.push_str(text.trim());
        confidences.push(confidence);

        segments.push(Segment {
            start_s,
            end_s,
            text: text.trim().to_string(),
            confidence,
        });
    }

    let avg_confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    };

    Ok(TranscriptOutput {
        full_text,
        segments,
        avg_confidence,
    })
}

/// Average per-token probability for segment `i`, mapped into `[0, 1]`.
fn segment_confidence(state: &whisper_rs::WhisperState, i: i32) -> f64 {
    let n_tokens = state.full_n_tokens(i).unwrap_or(0);
    if n_tokens == 0 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut count = 0u32;
    for t in 0..n_tokens {
        if let Ok(prob) = state.full_get_token_prob(i, t) {
            sum += prob as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Transcribe `audio_path` with the given model size, emitting progress
/// heartbeats through `on_progress` (§4.4).
#[instrument(skip(on_progress, models_dir))]
pub async fn transcribe(
    audio_path: &Path,
    models_dir: &Path,
    size: WhisperModelSize,
    language: Option<String>,
    on_progress: impl Fn(TranscribeProgress) + Send + Sync + 'static,
) -> Result<TranscriptOutput> {
    let pcm = decode_to_pcm(audio_path).await?;
    debug!(samples = pcm.len(), "decoded audio to 16kHz mono PCM");

    let ctx = get_or_load_model(models_dir, size)?;
    tokio::task::spawn_blocking(move || run_inference(ctx, pcm, language, on_progress))
        .await
        .map_err(|e| PipelineError::Invariant(format!("transcription task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_filenames_are_distinct() {
        let sizes = [
            WhisperModelSize::Tiny,
            WhisperModelSize::Base,
            WhisperModelSize::Small,
            WhisperModelSize::Medium,
            WhisperModelSize::Large,
        ];
        let names: std::collections::HashSet<_> = sizes.iter().map(|s| s.model_filename()).collect();
        assert_eq!(names.len(), sizes.len());
    }
}
