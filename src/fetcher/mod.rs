//! Fetcher (C3): pulls bytes from a remote URL into a staging area.
//!
//! Grounded on the teacher's `audio::downloader` (yt-dlp/ffmpeg shelling) and
//! `audio_source::youtube` (platform/id classification), generalized from a
//! YouTube-only downloader into the platform-classifying fetcher of §4.3.

use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::instrument;
use url::Url;

/// Result of a successful fetch (§4.3).
pub struct FetchOutput {
    pub downloaded_path: PathBuf,
    pub display_name: String,
    pub duration_s: Option<f64>,
    pub platform: String,
}

/// Progress update pushed onto the fetcher's bounded channel, drained by the
/// activity's heartbeat loop (§4.3's "independent of the data channel").
#[derive(Debug, Clone)]
pub enum FetchProgress {
    Bytes { done: u64, total: Option<u64> },
}

/// Classify the source platform by host suffix (§4.3).
pub fn classify_platform(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let known = [
        ("youtube.com", "youtube"),
        ("youtu.be", "youtube"),
        ("soundcloud.com", "soundcloud"),
        ("vimeo.com", "vimeo"),
    ];
    for (suffix, platform) in known {
        if host == suffix || host.ends_with(&format!(".{suffix}")) {
            return platform.to_string();
        }
    }
    "other".to_string()
}

/// Parse and validate the source URL (scheme + host required, §4.3).
pub fn validate_url(source_url: &str) -> Result<Url> {
    let url = Url::parse(source_url)
        .map_err(|e| PipelineError::Input(format!("invalid URL {source_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::Input(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(PipelineError::Input(format!("URL has no host: {source_url}")));
    }
    Ok(url)
}

/// Download the best audio stream via yt-dlp, transcode to MP3 at >=128kbit/s,
/// and stage the result into `work_dir`. Calls `on_progress` at most once per
/// second with byte counts drained from yt-dlp's `--newline` progress output.
#[instrument(skip(on_progress, work_dir))]
pub async fn fetch(
    source_url: &str,
    work_dir: &Path,
    on_progress: impl Fn(FetchProgress) + Send + Sync + 'static,
) -> Result<FetchOutput> {
    let url = validate_url(source_url)?;
    let platform = classify_platform(&url);

    std::fs::create_dir_all(work_dir)?;
    let id = uuid::Uuid::new_v4();
    let template = work_dir.join(format!("{id}.%(ext)s"));

    let mut child = Command::new("yt-dlp")
        .arg("--extract-audio")
        .arg("--audio-format")
        .arg("mp3")
        .arg("--audio-quality")
        .arg("0") // best VBR, always well above 128kbit/s
        .arg("--output")
        .arg(template.to_string_lossy().to_string())
        .arg("--no-playlist")
        .arg("--newline")
        .arg("--no-warnings")
        .arg(source_url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Input("yt-dlp is not installed".to_string())
            } else {
                PipelineError::transient("fetch", format!("failed to spawn yt-dlp: {e}"))
            }
        })?;

    let stdout = child.stdout.take().expect("piped stdout");
    let progress_task = tokio::spawn(drain_progress(stdout, on_progress));

    let status = child
        .wait()
        .await
        .map_err(|e| PipelineError::transient("fetch", format!("yt-dlp wait failed: {e}")))?;
    let _ = progress_task.await;

    if !status.success() {
        return Err(classify_exit_failure(&status));
    }

    let downloaded = find_output_file(work_dir, &id.to_string())?;
    let title = probe_title(source_url).await.unwrap_or_else(|| id.to_string());
    let duration_s = probe_duration(&downloaded).await;

    Ok(FetchOutput {
        downloaded_path: downloaded,
        display_name: sanitize_display_name(&title),
        duration_s,
        platform,
    })
}

async fn drain_progress(
    stdout: tokio::process::ChildStdout,
    on_progress: impl Fn(FetchProgress) + Send + Sync + 'static,
) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(stdout).lines();
    let mut last_emit = Instant::now() - Duration::from_secs(1);
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some((done, total)) = parse_ytdlp_progress_line(&line) {
            if last_emit.elapsed() >= Duration::from_secs(1) {
                on_progress(FetchProgress::Bytes { done, total });
                last_emit = Instant::now();
            }
        }
    }
}

/// Parse a yt-dlp `--newline` progress line, e.g.
/// `[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:05`.
fn parse_ytdlp_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    if !line.starts_with("[download]") {
        return None;
    }
    let percent_str = line.split('%').next()?.rsplit(' ').next()?;
    let percent: f64 = percent_str.parse().ok()?;
    let total = line
        .split("of ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(parse_size_token);
    let done = total.map(|t| ((percent / 100.0) * t as f64) as u64);
    Some((done.unwrap_or(percent as u64), total))
}

fn parse_size_token(token: &str) -> Option<u64> {
    let token = token.trim_end_matches(['i', 'B']);
    let (value, unit) = token.split_at(token.len().saturating_sub(1));
    let value: f64 = value.parse().ok()?;
    let mult: f64 = match unit {
        "K" => 1024.0,
        "M" => 1024.0 * 1024.0,
        "G" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    Some((value * mult) as u64)
}

fn classify_exit_failure(status: &std::process::ExitStatus) -> PipelineError {
    // yt-dlp doesn't expose HTTP status codes directly; treat any nonzero exit
    // as transient (network/extractor flake) per §4.3, which the caller's
    // retry policy will exhaust before converting to a job failure.
    PipelineError::transient("fetch", format!("yt-dlp exited with status {status}"))
}

fn find_output_file(dir: &Path, stem: &str) -> Result<PathBuf> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(stem) {
            return Ok(entry.path());
        }
    }
    Err(PipelineError::transient(
        "fetch",
        "downloaded file not found after yt-dlp exited successfully",
    ))
}

async fn probe_title(source_url: &str) -> Option<String> {
    let output = Command::new("yt-dlp")
        .args(["--dump-json", "--no-download", "--no-warnings", source_url])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    json["title"].as_str().map(|s| s.to_string())
}

async fn probe_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

fn sanitize_display_name(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        "download.mp3".to_string()
    } else {
        format!("{trimmed}.mp3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_platforms() {
        assert_eq!(classify_platform(&Url::parse("https://youtu.be/abc").unwrap()), "youtube");
        assert_eq!(
            classify_platform(&Url::parse("https://www.youtube.com/watch?v=abc").unwrap()),
            "youtube"
        );
        assert_eq!(
            classify_platform(&Url::parse("https://soundcloud.com/x").unwrap()),
            "soundcloud"
        );
        assert_eq!(classify_platform(&Url::parse("https://example.com/x").unwrap()), "other");
    }

    #[test]
    fn rejects_bad_scheme() {
        let err = validate_url("ftp://example.com/file.mp3").unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn parses_ytdlp_progress_line() {
        let line = "[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:05";
        let (done, total) = parse_ytdlp_progress_line(line).unwrap();
        assert!(total.unwrap() > 0);
        assert!(done > 0);
    }
}
