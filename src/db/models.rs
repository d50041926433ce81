//! Row types for the metadata store (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Upload,
    Download,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Upload => "upload",
            Origin::Download => "download",
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Origin::Upload),
            "download" => Ok(Origin::Download),
            other => Err(format!("unknown origin: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl std::str::FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Uuid,
    pub owner_id: String,
    pub stored_path: String,
    pub display_name: String,
    pub byte_size: i64,
    pub mime: Option<String>,
    pub duration_seconds: Option<f64>,
    pub content_hash: String,
    pub origin: Origin,
    pub origin_url: Option<String>,
    pub origin_platform: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub id: Uuid,
    pub media_file_id: Uuid,
    pub owner_id: String,
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub avg_confidence: Option<f32>,
    pub processing_seconds: Option<f64>,
    pub status: Status,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub transcription_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub start_s: Option<f64>,
    pub end_s: Option<f64>,
    pub start_char: Option<i64>,
    pub end_char: Option<i64>,
    pub topic_summary: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub confidence: Option<f32>,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub const UNKNOWN_TOPIC_NAME: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub kind: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionTopic {
    pub transcription_id: Uuid,
    pub topic_id: Uuid,
    pub ai_confidence: Option<f32>,
    pub ai_reasoning: Option<String>,
    pub assigned_by: Option<String>,
    pub user_reviewed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionCollection {
    pub transcription_id: Uuid,
    pub collection_id: Uuid,
    pub position: Option<i32>,
    pub assigned_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Download,
    Transcribe,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Transcribe => "transcribe",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "download" => Ok(JobKind::Download),
            "transcribe" => Ok(JobKind::Transcribe),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: JobKind,
    pub status: Status,
    pub error_text: Option<String>,
    pub media_file_id: Option<Uuid>,
    pub transcription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
