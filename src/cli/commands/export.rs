//! Export command - render a completed transcription as SRT (SPEC_FULL.md §B.1).

use crate::cli::Output;
use crate::config::AppConfig;
use crate::db::Db;
use crate::export;
use uuid::Uuid;

pub fn run_export(transcription_id: Uuid, output: Option<String>, config: &AppConfig) -> anyhow::Result<()> {
    let db = Db::open(&std::path::PathBuf::from(&config.database_url))?;

    let transcription = db
        .get_transcription(transcription_id)?
        .ok_or_else(|| anyhow::anyhow!("transcription {transcription_id} not found"))?;

    if transcription.segments.is_empty() {
        Output::warning("transcription has no segments (not completed, or completed with no speech detected)");
    }

    let srt = export::to_srt(&transcription.segments);

    match output {
        Some(path) => {
            std::fs::write(&path, &srt)?;
            Output::success(&format!("wrote {path}"));
        }
        None => print!("{srt}"),
    }

    Ok(())
}
