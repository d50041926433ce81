//! Media ingestion pipeline CLI entry point.

use anyhow::Result;
use clap::Parser;
use mediaforge::cli::{commands, Cli, Commands};
use mediaforge::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("mediaforge={log_level}")),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => AppConfig::load()?,
    };

    std::fs::create_dir_all(config.upload_root())?;
    std::fs::create_dir_all(config.work_root())?;
    std::fs::create_dir_all(config.models_root())?;

    match cli.command {
        Commands::Worker { stale_after_secs, interval_secs } => {
            commands::run_worker(stale_after_secs, interval_secs, config).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&config).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(&host, port, config).await?;
        }

        Commands::Export { transcription_id, output } => {
            commands::run_export(transcription_id, output, &config)?;
        }
    }

    Ok(())
}
