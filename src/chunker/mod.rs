//! Topic-coherent chunking (C5).
//!
//! Orchestrates `llm::LlmClient` against the configured strategy, with an
//! all-or-nothing validation pass on the model's JSON (any invalid chunk
//! discards the whole result, per `ollama_service.py`'s
//! `_parse_ollama_response`) and a deterministic sentence-based fallback.

pub mod llm;
pub mod sentence;

use crate::config::{ChunkSizing, ChunkingPrompts, ChunkingStrategy};
use crate::db::models::{Chunk, Segment};
use crate::error::{PipelineError, Result};
use llm::LlmClient;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

const CHARS_PER_TOKEN: usize = 4;

#[derive(Deserialize)]
struct RawChunk {
    start_pos: i64,
    end_pos: i64,
    topic: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct RawResponse {
    chunks: Vec<RawChunk>,
}

/// Produce chunks for a transcript according to `strategy`, falling back to
/// sentence chunking on any LLM failure or validation failure (§4.5).
pub async fn chunk_transcript(
    transcription_id: Uuid,
    transcript: &str,
    segments: &[Segment],
    strategy: ChunkingStrategy,
    sizing: &ChunkSizing,
    prompts: &ChunkingPrompts,
    llm: &LlmClient,
    on_heartbeat: &mut (dyn FnMut() + Send),
) -> Result<Vec<Chunk>> {
    match strategy {
        ChunkingStrategy::Single => Ok(sentence::chunk_as_single(transcription_id, transcript)),
        ChunkingStrategy::Sentence => Ok(sentence::chunk_by_sentences(transcription_id, transcript, sizing)),
        ChunkingStrategy::Llm => {
            match chunk_with_llm(transcription_id, transcript, segments, sizing, prompts, llm, on_heartbeat).await {
                Ok(chunks) => Ok(chunks),
                Err(e) => {
                    warn!(error = %e, "LLM chunking failed, falling back to sentence chunking");
                    Ok(sentence::chunk_by_sentences(transcription_id, transcript, sizing))
                }
            }
        }
    }
}

async fn chunk_with_llm(
    transcription_id: Uuid,
    transcript: &str,
    segments: &[Segment],
    sizing: &ChunkSizing,
    prompts: &ChunkingPrompts,
    llm: &LlmClient,
    on_heartbeat: &mut (dyn FnMut() + Send),
) -> Result<Vec<Chunk>> {
    llm.check_liveness().await?;

    let mut vars = HashMap::new();
    vars.insert("min_tokens".to_string(), sizing.min_tokens.to_string());
    vars.insert("max_tokens".to_string(), sizing.max_tokens.to_string());
    vars.insert("min_chars".to_string(), (sizing.min_tokens as usize * CHARS_PER_TOKEN).to_string());
    vars.insert("max_chars".to_string(), (sizing.max_tokens as usize * CHARS_PER_TOKEN).to_string());
    vars.insert("length".to_string(), transcript.chars().count().to_string());
    vars.insert("transcript".to_string(), transcript.to_string());
    let user_prompt = crate::config::Prompts::render(&prompts.user, &vars);

    let raw_response = llm.complete(&prompts.system, &user_prompt, on_heartbeat).await?;
    parse_and_validate(transcription_id, &raw_response, transcript, segments)
}

static THINK_TAGS: OnceLock<Regex> = OnceLock::new();

fn strip_thinking_tags(response: &str) -> String {
    let re = THINK_TAGS.get_or_init(|| {
        Regex::new(r"(?is)<think>.*?</think>|<thinking>.*?</thinking>|```think.*?```").unwrap()
    });
    re.replace_all(response, "").to_string()
}

/// Extract the first balanced `{...}` object from `response`, tolerant of
/// surrounding prose some models add despite instructions.
fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let bytes = response.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_and_validate(
    transcription_id: Uuid,
    raw_response: &str,
    transcript: &str,
    segments: &[Segment],
) -> Result<Vec<Chunk>> {
    let stripped = strip_thinking_tags(raw_response);
    let json_str = extract_json_object(&stripped)
        .ok_or_else(|| PipelineError::Validation("no JSON object found in LLM response".to_string()))?;
    let parsed: RawResponse = serde_json::from_str(json_str)
        .map_err(|e| PipelineError::Validation(format!("LLM response is not valid chunk JSON: {e}")))?;

    if parsed.chunks.is_empty() {
        return Err(PipelineError::Validation("LLM returned zero chunks".to_string()));
    }

    let transcript_len = transcript.chars().count() as i64;
    let char_indices: Vec<usize> = transcript.char_indices().map(|(i, _)| i).chain(std::iter::once(transcript.len())).collect();

    let mut chunks = Vec::with_capacity(parsed.chunks.len());
    for (idx, raw) in parsed.chunks.iter().enumerate() {
        if raw.start_pos < 0 || raw.end_pos > transcript_len || raw.start_pos >= raw.end_pos {
            return Err(PipelineError::Validation(format!(
                "chunk {idx} has invalid positions [{}, {})",
                raw.start_pos, raw.end_pos
            )));
        }
        if idx == 0 && raw.start_pos != 0 {
            return Err(PipelineError::Validation("first chunk does not start at 0".to_string()));
        }
        if idx == parsed.chunks.len() - 1 && raw.end_pos != transcript_len {
            return Err(PipelineError::Validation("last chunk does not end at transcript length".to_string()));
        }

        let byte_start = char_indices[raw.start_pos as usize];
        let byte_end = char_indices[raw.end_pos as usize];
        let text = transcript[byte_start..byte_end].to_string();
        let (start_s, end_s) = map_to_timestamps(raw.start_pos, raw.end_pos, transcript, segments);

        chunks.push(Chunk {
            id: Uuid::new_v4(),
            transcription_id,
            chunk_index: idx as i32,
            text,
            start_s,
            end_s,
            start_char: Some(raw.start_pos),
            end_char: Some(raw.end_pos),
            topic_summary: raw.topic.clone(),
            keywords: if raw.keywords.is_empty() { None } else { Some(raw.keywords.clone()) },
            confidence: raw.confidence,
            embedding: None,
        });
    }

    for pair in chunks.windows(2) {
        if pair[0].end_char != pair[1].start_char {
            return Err(PipelineError::Validation(format!(
                "gap or overlap between chunk {} and {} (K2)",
                pair[0].chunk_index, pair[1].chunk_index
            )));
        }
    }

    info!(chunk_count = chunks.len(), "parsed LLM chunk response");
    Ok(chunks)
}

/// Map a `[start_char, end_char)` range onto Whisper segment timestamps by
/// walking segments in order and accumulating their text lengths, mirroring
/// `ollama_service.py`'s `_map_to_timestamps`.
fn map_to_timestamps(start_char: i64, end_char: i64, _transcript: &str, segments: &[Segment]) -> (Option<f64>, Option<f64>) {
    if segments.is_empty() {
        return (None, None);
    }

    let mut current_pos: i64 = 0;
    let mut start_time = None;
    let mut end_time = None;

    for segment in segments {
        let len = segment.text.chars().count() as i64;
        let segment_end_pos = current_pos + len;

        if start_time.is_none() && current_pos <= start_char && start_char < segment_end_pos {
            start_time = Some(segment.start_s);
        }
        if current_pos <= end_char && end_char <= segment_end_pos {
            end_time = Some(segment.end_s);
            break;
        }
        current_pos = segment_end_pos;
    }

    if start_time.is_none() {
        start_time = Some(segments[0].start_s);
    }
    if end_time.is_none() {
        end_time = Some(segments[segments.len() - 1].end_s);
    }
    (start_time, end_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_think_tags() {
        let raw = "<think>reasoning here</think>{\"chunks\":[]}";
        assert_eq!(strip_thinking_tags(raw), "{\"chunks\":[]}");
    }

    #[test]
    fn extracts_balanced_json_with_surrounding_prose() {
        let raw = "Sure, here you go:\n{\"chunks\": [{\"a\": 1}]}\nHope that helps!";
        assert_eq!(extract_json_object(raw).unwrap(), r#"{"chunks": [{"a": 1}]}"#);
    }

    #[test]
    fn valid_response_parses_into_chunks() {
        let transcript = "Hello world. Goodbye world.";
        let segments = vec![Segment {
            start_s: 0.0,
            end_s: 2.0,
            text: transcript.to_string(),
            confidence: None,
        }];
        let response = r#"{"chunks":[{"start_pos":0,"end_pos":12,"topic":"greeting","keywords":["hello"],"confidence":0.9},{"start_pos":12,"end_pos":28,"topic":"farewell","keywords":["goodbye"],"confidence":0.8}]}"#;
        let chunks = parse_and_validate(Uuid::new_v4(), response, transcript, &segments).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].end_char, chunks[1].start_char);
    }

    #[test]
    fn invalid_chunk_rejects_whole_response() {
        let transcript = "Hello world.";
        let response = r#"{"chunks":[{"start_pos":5,"end_pos":2,"topic":"bad"}]}"#;
        let err = parse_and_validate(Uuid::new_v4(), response, transcript, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn gap_between_chunks_is_rejected() {
        let transcript = "Hello world. Goodbye world.";
        let response = r#"{"chunks":[{"start_pos":0,"end_pos":10,"topic":"a"},{"start_pos":12,"end_pos":28,"topic":"b"}]}"#;
        let err = parse_and_validate(Uuid::new_v4(), response, transcript, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
