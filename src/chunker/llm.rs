//! Hand-rolled OpenAI-compatible chat-completions SSE client.
//!
//! Grounded on `other_examples`' `slb350-open-agent-sdk-rust` streaming utils
//! (line-based `data: ` SSE parsing, delta accumulation) and the original
//! `ollama_service.py`'s `_call_ollama_with_retry` (streaming over
//! `/v1/chat/completions`, silently dropping `delta.reasoning` tokens).
//! `async-openai` can't express `delta.reasoning`, which is why this is
//! hand-rolled over `reqwest` rather than going through that crate.

use crate::config::LlmSettings;
use crate::error::{PipelineError, Result};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const CHARS_PER_TOKEN: usize = 4;
/// Heartbeat once this many output tokens have streamed in (§4.5 step 3).
const HEARTBEAT_OUTPUT_TOKENS: usize = 20;
/// Heartbeat once this many reasoning tokens have streamed in (§4.5 step 3).
const HEARTBEAT_REASONING_TOKENS: usize = 50;

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<ChunkChoice>,
}

/// A thin client over one OpenAI-compatible server, shared by the chunker
/// (C5) and the topic classifier (C7) per the Open Question resolution in
/// SPEC_FULL.md §D.
pub struct LlmClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }

    /// `GET /models` liveness probe with a short connect/read timeout,
    /// independent of the main request timeout (§4.5's "liveness check").
    pub async fn check_liveness(&self) -> Result<()> {
        let url = format!("{}/v1/models", self.settings.base_url);
        let response = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.settings.connect_timeout_secs))
            .timeout(Duration::from_secs(self.settings.read_timeout_secs))
            .build()?
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::transient("llm", format!("liveness check failed: {e}")))?;
        if !response.status().is_success() {
            return Err(PipelineError::transient(
                "llm",
                format!("liveness check returned status {}", response.status()),
            ));
        }
        Ok(())
    }

    /// Stream a chat completion and return the fully-assembled response text.
    /// Reasoning-only deltas (`delta.reasoning`, only emitted by some Ollama
    /// models) are heartbeat-only — counted toward the pacing below but never
    /// appended to the returned text. `on_heartbeat` fires once per
    /// `HEARTBEAT_OUTPUT_TOKENS` output tokens or `HEARTBEAT_REASONING_TOKENS`
    /// reasoning tokens accumulated since the last firing (§4.5 step 3).
    pub async fn complete(&self, system: &str, user: &str, on_heartbeat: &mut (dyn FnMut() + Send)) -> Result<String> {
        let body = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": true,
            "temperature": 0.3,
            "top_p": 0.9,
            "max_tokens": 4000,
        });

        let url = format!("{}/v1/chat/completions", self.settings.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::transient("llm", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::transient(
                "llm",
                format!("chat completion returned status {}", response.status()),
            ));
        }

        let mut full_response = String::new();
        let mut stream = response.bytes_stream();
        let mut carry = String::new();
        let mut output_chars_since_heartbeat = 0usize;
        let mut reasoning_chars_since_heartbeat = 0usize;

        while let Some(item) = stream.next().await {
            let bytes = item.map_err(|e| PipelineError::transient("llm", format!("stream read failed: {e}")))?;
            carry.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = carry.find('\n') {
                let line = carry[..newline_pos].trim_end_matches('\r').to_string();
                carry.drain(..=newline_pos);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<StreamChunk>(data) {
                    Ok(parsed) => {
                        for choice in parsed.choices {
                            if let Some(content) = choice.delta.content {
                                output_chars_since_heartbeat += content.chars().count();
                                full_response.push_str(&content);
                            }
                            if let Some(reasoning) = choice.delta.reasoning {
                                reasoning_chars_since_heartbeat += reasoning.chars().count();
                            }
                            if choice.finish_reason.is_some() {
                                debug!(len = full_response.len(), "llm stream finished");
                            }
                        }
                        if output_chars_since_heartbeat / CHARS_PER_TOKEN >= HEARTBEAT_OUTPUT_TOKENS
                            || reasoning_chars_since_heartbeat / CHARS_PER_TOKEN >= HEARTBEAT_REASONING_TOKENS
                        {
                            on_heartbeat();
                            output_chars_since_heartbeat = 0;
                            reasoning_chars_since_heartbeat = 0;
                        }
                    }
                    Err(e) => {
                        warn!(%e, "skipping malformed SSE data line");
                    }
                }
            }
        }

        Ok(full_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_defaults() {
        let client = LlmClient::new(LlmSettings::default());
        assert!(client.is_ok());
    }
}
