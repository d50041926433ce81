//! Content-addressed object store (C1).
//!
//! Layout: `<root>/user_<owner_id>/<YYYY>/<MM>/<hash16>_<sanitized_name>.<ext>`.
//! Grounded on the teacher's `Settings::data_dir()` / `create_dir_all` filesystem
//! conventions, generalized to the hashing and dedup rule of §4.1.

use crate::db::models::{MediaFile, Origin};
use crate::db::Db;
use crate::error::{PipelineError, Result};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

const HASH_PREFIX_LEN: usize = 16;
const MAX_NAME_BYTES: usize = 200;

pub struct ContentStore {
    root: PathBuf,
}

/// Outcome of `ingest`.
pub struct IngestResult {
    pub media_file: MediaFile,
    pub is_duplicate: bool,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join("_staging")
    }

    /// Write `bytes` to a staging file, fsync, and return its path (§4.1 `stage`).
    #[instrument(skip(self, bytes))]
    pub fn stage(&self, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.staging_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.part", Uuid::new_v4()));
        let mut file = std::fs::File::create(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Sweep staging files older than `max_age_secs` (§9 "swept on worker start").
    pub fn sweep_staging(&self, max_age_secs: u64) -> Result<usize> {
        let dir = self.staging_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let age = entry.metadata()?.modified()?.elapsed().unwrap_or_default();
            if age.as_secs() > max_age_secs {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Move a staged file into the content-addressed tree, deduplicating by
    /// `(owner, content_hash)` (§4.1 `ingest`).
    #[instrument(skip(self, db))]
    pub fn ingest(
        &self,
        db: &Db,
        owner_id: &str,
        display_name: &str,
        staging_path: &Path,
        origin: Origin,
        origin_url: Option<&str>,
        origin_platform: Option<&str>,
    ) -> Result<IngestResult> {
        let content_hash = hash_file(staging_path)?;

        if let Some(existing) = db.find_media_file_by_hash(owner_id, &content_hash)? {
            let _ = std::fs::remove_file(staging_path);
            return Ok(IngestResult {
                media_file: existing,
                is_duplicate: true,
            });
        }

        let final_path = self.final_path(owner_id, &content_hash, display_name);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(staging_path, &final_path)
            .map_err(|e| PipelineError::ContentStore(format!("rename into place failed: {e}")))?;

        let byte_size = std::fs::metadata(&final_path)?.len() as i64;
        let duration_seconds = probe_duration(&final_path);
        let mime = probe_mime(&final_path);

        let media_file = MediaFile {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            stored_path: final_path.to_string_lossy().to_string(),
            display_name: display_name.to_string(),
            byte_size,
            mime,
            duration_seconds,
            content_hash: content_hash.clone(),
            origin,
            origin_url: origin_url.map(|s| s.to_string()),
            origin_platform: origin_platform.map(|s| s.to_string()),
            created_at: chrono::Utc::now(),
        };

        match db.insert_media_file(&media_file) {
            Ok(()) => {
                info!(media_file_id = %media_file.id, %content_hash, "ingested new media file");
                Ok(IngestResult {
                    media_file,
                    is_duplicate: false,
                })
            }
            Err(PipelineError::Integrity(_)) => {
                // Lost the race: another writer inserted the same (owner, hash)
                // first. Roll back our rename and return their row (§4.1 step 5).
                let _ = std::fs::remove_file(&final_path);
                let existing = db
                    .find_media_file_by_hash(owner_id, &content_hash)?
                    .ok_or_else(|| {
                        PipelineError::Invariant(
                            "integrity conflict but no existing row found".to_string(),
                        )
                    })?;
                Ok(IngestResult {
                    media_file: existing,
                    is_duplicate: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the DB row first, then best-effort unlink the blob (§4.1 `delete`).
    #[instrument(skip(self, db))]
    pub fn delete(&self, db: &Db, media_file_id: Uuid) -> Result<()> {
        if let Some(path) = db.delete_media_file(media_file_id)? {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn final_path(&self, owner_id: &str, content_hash: &str, display_name: &str) -> PathBuf {
        let now = chrono::Utc::now();
        let hash16 = &content_hash[..content_hash.len().min(HASH_PREFIX_LEN)];
        let (base, ext) = split_extension(display_name);
        let sanitized = sanitize_name(&base);
        let file_name = match ext {
            Some(ext) => format!("{hash16}_{sanitized}.{ext}"),
            None => format!("{hash16}_{sanitized}"),
        };
        self.root
            .join(format!("user_{owner_id}"))
            .join(format!("{:04}", now.format("%Y")))
            .join(format!("{:02}", now.format("%m")))
            .join(file_name)
    }
}

/// Replace any char outside `[A-Za-z0-9_-]` with `_`, collapse runs, trim, and
/// bound to `MAX_NAME_BYTES` (§4.1).
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if keep {
            out.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    let mut bounded: String = trimmed.chars().collect();
    while bounded.len() > MAX_NAME_BYTES {
        bounded.pop();
    }
    if bounded.is_empty() {
        "file".to_string()
    } else {
        bounded
    }
}

fn split_extension(display_name: &str) -> (String, Option<String>) {
    match display_name.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') => {
            (base.to_string(), Some(ext.to_lowercase()))
        }
        _ => (display_name.to_string(), None),
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Best-effort duration probe via `ffprobe`; `None` on any failure (§4.1 step 4).
fn probe_duration(path: &Path) -> Option<f64> {
    let output = std::process::Command::new("ffprobe")
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
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Best-effort mime sniff from the file extension; `None` if unrecognized.
fn probe_mime(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_weird_names() {
        assert_eq!(sanitize_name("my video!! (final).mp3"), "my_video_final_.mp3");
        assert_eq!(sanitize_name("___"), "file");
    }

    #[test]
    fn splits_known_extensions() {
        let (base, ext) = split_extension("lecture.mp3");
        assert_eq!(base, "lecture");
        assert_eq!(ext, Some("mp3".to_string()));
    }

    #[test]
    fn stage_then_ingest_dedups_on_second_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::new(tmp.path());
        let db = Db::in_memory().unwrap();

        let staged1 = store.stage(b"hello world").unwrap();
        let result1 = store
            .ingest(&db, "u1", "clip.mp3", &staged1, Origin::Upload, None, None)
            .unwrap();
        assert!(!result1.is_duplicate);
        assert!(Path::new(&result1.media_file.stored_path).exists());

        let staged2 = store.stage(b"hello world").unwrap();
        let result2 = store
            .ingest(&db, "u1", "clip.mp3", &staged2, Origin::Upload, None, None)
            .unwrap();
        assert!(result2.is_duplicate);
        assert_eq!(result2.media_file.id, result1.media_file.id);
        assert!(!staged2.exists());
    }

    #[test]
    fn delete_removes_row_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::new(tmp.path());
        let db = Db::in_memory().unwrap();

        let staged = store.stage(b"some bytes").unwrap();
        let result = store
            .ingest(&db, "u1", "clip.mp3", &staged, Origin::Upload, None, None)
            .unwrap();
        let stored_path = result.media_file.stored_path.clone();

        store.delete(&db, result.media_file.id).unwrap();
        assert!(db.get_media_file(result.media_file.id).unwrap().is_none());
        assert!(!Path::new(&stored_path).exists());
    }
}
