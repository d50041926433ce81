//! Dense vector embedding (C6).
//!
//! Grounded on the teacher's `embedding::openai::OpenAIEmbedder` (batch shape,
//! lazy client, dimensions contract), swapped from the OpenAI embeddings API
//! onto a local `fastembed` encoder per §4.6 (see also `other_examples`'
//! `marlonsc-mcb` and `moabualruz-ricecoder` manifests for the `fastembed`
//! dependency).

use crate::error::{PipelineError, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, instrument};

/// Fixed embedding dimensionality for the configured model (§4.6).
pub const EMBEDDING_DIM: usize = 384;

/// Texts longer than this are truncated before encoding (§4.6).
const MAX_CHARS: usize = 5000;

static MODEL: OnceLock<Mutex<TextEmbedding>> = OnceLock::new();

fn model() -> Result<&'static Mutex<TextEmbedding>> {
    if let Some(m) = MODEL.get() {
        return Ok(m);
    }
    let init = InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
    let embedding = TextEmbedding::try_new(init)
        .map_err(|e| PipelineError::Invariant(format!("failed to load embedding model: {e}")))?;
    Ok(MODEL.get_or_init(|| Mutex::new(embedding)))
}

/// Encode a batch of chunk texts into fixed-size dense vectors. Empty strings
/// map to a zero vector rather than being sent to the model (§4.6).
#[instrument(skip(texts), fields(count = texts.len()))]
pub fn embed_batch(texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut non_empty_indices = Vec::new();
    let mut non_empty_texts = Vec::new();
    for (i, t) in texts.iter().enumerate() {
        let truncated: String = t.chars().take(MAX_CHARS).collect();
        if !truncated.trim().is_empty() {
            non_empty_indices.push(i);
            non_empty_texts.push(truncated);
        }
    }

    let mut out = vec![vec![0.0f32; EMBEDDING_DIM]; texts.len()];
    if non_empty_texts.is_empty() {
        return Ok(out);
    }

    let model_handle = model()?;
    let guard = model_handle.lock().unwrap_or_else(|p| p.into_inner());
    let embeddings = guard
        .embed(non_empty_texts, None)
        .map_err(|e| PipelineError::transient("embed", format!("embedding inference failed: {e}")))?;

    debug!(encoded = embeddings.len(), "embedded chunk batch");
    for (idx, embedding) in non_empty_indices.into_iter().zip(embeddings) {
        out[idx] = embedding;
    }
    Ok(out)
}

/// Encode a single query string (§4.10 search).
pub fn embed_query(text: &str) -> Result<Vec<f32>> {
    let result = embed_batch(std::slice::from_ref(&text.to_string()))?;
    result
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Invariant("embed_batch returned no vector for single input".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_empty_output() {
        assert!(embed_batch(&[]).unwrap().is_empty());
    }
}
