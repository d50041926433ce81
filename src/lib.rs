//! Local-first media ingestion pipeline: transcription, topic-coherent
//! chunking, dense vector embedding, and semantic search.
//!
//! # Architecture
//!
//! - `config` - runtime configuration (env + TOML)
//! - `db` - SQLite-backed metadata repositories (C2)
//! - `content_store` - content-addressed file storage (C1)
//! - `fetcher` - URL-based media download (C3)
//! - `transcriber` - local speech-to-text via Whisper (C4)
//! - `chunker` - topic-coherent chunking, LLM-assisted with a deterministic
//!   fallback (C5)
//! - `classifier` - canonical topic classification (C7)
//! - `embedder` - dense sentence embeddings (C6)
//! - `search` - semantic search over embedded chunks (C10)
//! - `progress` - per-job progress fan-out (C9)
//! - `workflow` - durable activity orchestration for the download and
//!   transcribe pipelines (C8)
//! - `api` - the HTTP surface described in §6
//! - `export` - SRT rendering of a completed transcription
//! - `cli` - command-line entry points

pub mod api;
pub mod chunker;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod content_store;
pub mod db;
pub mod embedder;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod progress;
pub mod search;
pub mod transcriber;
pub mod workflow;

pub use error::{PipelineError, Result};
