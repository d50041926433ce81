//! Configuration: runtime settings (env-var driven) and LLM prompt templates.

mod prompts;
mod settings;

pub use prompts::{ChunkingPrompts, ClassificationPrompts, Prompts};
pub use settings::{
    AppConfig, ChunkSizing, ChunkingStrategy, HeartbeatSettings, LlmSettings, WhisperModelSize,
};
