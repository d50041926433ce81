//! Doctor command - verify system requirements and configuration.

use crate::chunker::llm::LlmClient;
use crate::cli::Output;
use crate::config::AppConfig;
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(config: &AppConfig) -> anyhow::Result<()> {
    Output::header("Media ingestion pipeline doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    let tool_checks = vec![
        check_tool("ffmpeg", "ffmpeg -version", install_hint_ffmpeg()),
        check_tool("ffprobe", "ffprobe -version", install_hint_ffmpeg()),
        check_tool("yt-dlp", "yt-dlp --version", install_hint_ytdlp()),
    ];
    for check in &tool_checks {
        check.print();
    }
    checks.extend(tool_checks);

    println!();

    println!("{}", style("Whisper model").bold());
    let model_check = check_whisper_model(config);
    model_check.print();
    checks.push(model_check);

    println!();

    println!("{}", style("LLM endpoint").bold());
    let llm_check = check_llm_endpoint(config).await;
    llm_check.print();
    checks.push(llm_check);

    println!();

    println!("{}", style("Directories").bold());
    let dir_checks = check_directories(config);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!("{errors} error(s) found. Fix them before running the pipeline."));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {warnings} warning(s)."));
    } else {
        Output::success("All checks passed! The pipeline is ready to run.");
    }

    Ok(())
}

fn check_tool(name: &str, version_cmd: &str, hint: &str) -> CheckResult {
    let parts: Vec<&str> = version_cmd.split_whitespace().collect();
    let cmd = parts[0];
    let args = &parts[1..];

    match Command::new(cmd).args(args).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();
            let version_display = if version.len() > 50 {
                format!("{}...", &version[..50])
            } else {
                version
            };
            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::error(name, "not found", hint),
        Err(e) => CheckResult::error(name, &format!("error: {e}"), hint),
    }
}

/// Whether the ggml model file for the configured size is present (§4.4).
fn check_whisper_model(config: &AppConfig) -> CheckResult {
    let models_dir = config.models_root();
    let path = crate::transcriber::model_path(&models_dir, config.whisper_model_size);
    if path.exists() {
        CheckResult::ok(
            "Whisper model",
            &format!("{} ({})", config.whisper_model_size, path.display()),
        )
    } else {
        CheckResult::error(
            "Whisper model",
            &format!("{} not found at {}", config.whisper_model_size, path.display()),
            "Download a ggml model from https://huggingface.co/ggerganov/whisper.cpp and place it under WHISPER_MODELS_DIR",
        )
    }
}

/// Whether the configured LLM endpoint is reachable (C5/C7's shared client).
async fn check_llm_endpoint(config: &AppConfig) -> CheckResult {
    match LlmClient::new(config.llm.clone()) {
        Ok(client) => match client.check_liveness().await {
            Ok(()) => CheckResult::ok("LLM endpoint", &format!("reachable at {}", config.llm.base_url)),
            Err(e) => CheckResult::warning(
                "LLM endpoint",
                &format!("{} unreachable: {e}", config.llm.base_url),
                "Semantic chunking and topic classification fall back to deterministic paths without it",
            ),
        },
        Err(e) => CheckResult::error("LLM endpoint", &format!("failed to build client: {e}"), "Check LLM_BASE_URL"),
    }
}

fn check_directories(config: &AppConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (name, dir) in [
        ("Upload directory", config.upload_root()),
        ("Work directory", config.work_root()),
        ("Models directory", config.models_root()),
    ] {
        if dir.exists() {
            results.push(CheckResult::ok(name, &format!("{}", dir.display())));
        } else {
            results.push(CheckResult::warning(
                name,
                &format!("{} (will be created)", dir.display()),
                "Directory will be created on first use",
            ));
        }
    }

    let db_path = std::path::PathBuf::from(&config.database_url);
    if db_path.exists() {
        let size = std::fs::metadata(&db_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        results.push(CheckResult::ok("Database", &format!("{} ({size})", db_path.display())));
    } else {
        results.push(CheckResult::warning(
            "Database",
            &format!("{} (not created yet)", db_path.display()),
            "Database will be created on first run",
        ));
    }

    results
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}

fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_result_ok_has_no_hint() {
        let result = CheckResult::ok("test", "passed");
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.hint.is_none());
    }

    #[test]
    fn check_result_error_carries_hint() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn format_size_picks_the_right_unit() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
