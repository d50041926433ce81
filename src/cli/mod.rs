//! CLI module for the media ingestion pipeline.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Local-first media ingestion pipeline: transcription, topic chunking,
/// embedding, and semantic search.
#[derive(Parser, Debug)]
#[command(name = "mediaforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the workflow supervisor: seeds default topics, sweeps stale
    /// content-store staging files, and requeues jobs stuck in `processing`.
    Worker {
        /// Seconds a job may sit in `processing` before it's marked failed
        #[arg(long, default_value = "1800")]
        stale_after_secs: i64,

        /// Seconds between sweeps
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Start the HTTP API server (§6 external interfaces)
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Export a completed transcription as SRT
    Export {
        /// Transcription id to export
        transcription_id: uuid::Uuid,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}
