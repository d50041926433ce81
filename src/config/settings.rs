//! Runtime configuration, loaded once at worker/server startup.
//!
//! The environment variables in this module are the source of truth (§6 of the
//! design); an optional TOML file underneath them supplies values that aren't
//! naturally env-var shaped. Layering: env var > TOML file > built-in default.

use super::Prompts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whisper model size tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModelSize {
    Tiny,
    Base,
    #[default]
    Small,
    Medium,
    Large,
}

impl std::str::FromStr for WhisperModelSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(format!("unknown whisper model size: {s}")),
        }
    }
}

impl std::fmt::Display for WhisperModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        };
        write!(f, "{s}")
    }
}

/// Chunking strategy selector (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    #[default]
    Llm,
    Sentence,
    Single,
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "sentence" => Ok(Self::Sentence),
            "single" => Ok(Self::Single),
            _ => Err(format!("unknown chunking strategy: {s}")),
        }
    }
}

/// Chunk sizing knobs, token-approximated as `chars / 4` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkSizing {
    pub min_tokens: u32,
    pub max_tokens: u32,
    pub overlap_tokens: u32,
}

impl Default for ChunkSizing {
    fn default() -> Self {
        Self {
            min_tokens: 100,
            max_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

/// LLM client settings shared by the chunker (C5) and topic classifier (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            timeout_secs: 120,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            max_retries: 3,
        }
    }
}

/// Activity heartbeat/timeout knobs (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 300,
        }
    }
}

/// Root configuration record (§6, §9 "Dynamic config objects").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: String,
    pub work_dir: String,
    pub models_dir: String,
    pub max_file_size: u64,
    pub whisper_model_size: WhisperModelSize,
    pub enable_semantic_chunking: bool,
    pub chunking_strategy: ChunkingStrategy,
    pub llm: LlmSettings,
    pub chunk_sizing: ChunkSizing,
    pub heartbeat: HeartbeatSettings,
    pub embedding_dim: u32,
    pub prompts: Prompts,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Load configuration, layering env vars over an optional TOML file over defaults.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let mut cfg = match path.cloned().or_else(Self::default_config_path_if_exists) {
            Some(p) => {
                let content = std::fs::read_to_string(&p)?;
                toml::from_str(&content)?
            }
            None => AppConfig::default_values(),
        };

        cfg.database_url = env_string("DATABASE_URL", &cfg.database_url);
        cfg.upload_dir = env_string("UPLOAD_DIR", &cfg.upload_dir);
        cfg.work_dir = env_string("WORK_DIR", &cfg.work_dir);
        cfg.models_dir = env_string("WHISPER_MODELS_DIR", &cfg.models_dir);
        cfg.max_file_size = env_or("MAX_FILE_SIZE", cfg.max_file_size);
        cfg.whisper_model_size = std::env::var("WHISPER_MODEL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.whisper_model_size);
        cfg.enable_semantic_chunking = env_or("ENABLE_SEMANTIC_CHUNKING", cfg.enable_semantic_chunking);
        cfg.chunking_strategy = std::env::var("CHUNKING_STRATEGY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.chunking_strategy);
        if !cfg.enable_semantic_chunking {
            cfg.chunking_strategy = ChunkingStrategy::Single;
        }

        cfg.llm.base_url = env_string("LLM_BASE_URL", &cfg.llm.base_url);
        cfg.llm.model = env_string("LLM_MODEL", &cfg.llm.model);
        cfg.llm.timeout_secs = env_or("LLM_TIMEOUT", cfg.llm.timeout_secs);
        cfg.llm.connect_timeout_secs = env_or("LLM_CONNECT_TIMEOUT", cfg.llm.connect_timeout_secs);
        cfg.llm.read_timeout_secs = env_or("LLM_READ_TIMEOUT", cfg.llm.read_timeout_secs);
        cfg.llm.max_retries = env_or("LLM_MAX_RETRIES", cfg.llm.max_retries);

        cfg.chunk_sizing.min_tokens = env_or("CHUNK_MIN_TOKENS", cfg.chunk_sizing.min_tokens);
        cfg.chunk_sizing.max_tokens = env_or("CHUNK_MAX_TOKENS", cfg.chunk_sizing.max_tokens);
        cfg.chunk_sizing.overlap_tokens = env_or("CHUNK_OVERLAP_TOKENS", cfg.chunk_sizing.overlap_tokens);

        cfg.heartbeat.interval_secs = env_or("ACTIVITY_HEARTBEAT_INTERVAL", cfg.heartbeat.interval_secs);
        cfg.heartbeat.timeout_secs = env_or("ACTIVITY_HEARTBEAT_TIMEOUT", cfg.heartbeat.timeout_secs);

        Ok(cfg)
    }

    fn default_values() -> Self {
        Self {
            database_url: "pipeline.db".to_string(),
            upload_dir: "uploads".to_string(),
            work_dir: "work".to_string(),
            models_dir: "models".to_string(),
            max_file_size: 1024 * 1024 * 1024,
            whisper_model_size: WhisperModelSize::default(),
            enable_semantic_chunking: true,
            chunking_strategy: ChunkingStrategy::default(),
            llm: LlmSettings::default(),
            chunk_sizing: ChunkSizing::default(),
            heartbeat: HeartbeatSettings::default(),
            embedding_dim: 384,
            prompts: Prompts::default(),
        }
    }

    fn default_config_path_if_exists() -> Option<PathBuf> {
        let path = Self::default_config_path();
        path.exists().then_some(path)
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediaforge")
            .join("config.toml")
    }

    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn upload_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.upload_dir).to_string())
    }

    pub fn work_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.work_dir).to_string())
    }

    pub fn models_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.models_dir).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_llm_strategy() {
        let cfg = AppConfig::default_values();
        assert_eq!(cfg.chunking_strategy, ChunkingStrategy::Llm);
        assert_eq!(cfg.embedding_dim, 384);
    }

    #[test]
    fn disabling_semantic_chunking_forces_single_strategy() {
        std::env::set_var("ENABLE_SEMANTIC_CHUNKING", "false");
        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.chunking_strategy, ChunkingStrategy::Single);
        std::env::remove_var("ENABLE_SEMANTIC_CHUNKING");
    }
}
