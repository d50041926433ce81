//! Error types for the pipeline.
//!
//! Variants map onto the error taxonomy (kinds, not type names): input errors are
//! fatal and not retried; transient errors are retried by the workflow runtime;
//! validation errors trigger a component's own fallback rather than failing a job.

use thiserror::Error;

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad URL, unsupported source, missing file, unknown id. Fatal, not retried.
    #[error("input error: {0}")]
    Input(String),

    /// Network timeout, 5xx, transient disk error. Retried per activity policy.
    #[error("transient error in {stage}: {message}")]
    Transient { stage: String, message: String },

    /// Duplicate content hash or unique-constraint race. Handled inline by the caller.
    #[error("integrity conflict: {0}")]
    Integrity(String),

    /// Malformed or incoherent model output. Triggers a deterministic fallback.
    #[error("validation error: {0}")]
    Validation(String),

    /// An invariant (K1/K2/T1/...) was violated after a write. Fatal.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Activity timed out or was externally cancelled.
    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("content store error: {0}")]
    ContentStore(String),

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stage-tagged transient error, matching §7's "wrapped with the stage name" rule.
    pub fn transient(stage: &str, message: impl std::fmt::Display) -> Self {
        PipelineError::Transient {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the workflow runtime should retry an activity that returned this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient { .. } | PipelineError::Http(_))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
