//! Relational metadata store (C2).
//!
//! A `rusqlite`-backed store behind a narrow per-entity repository interface,
//! the way the teacher's `vector_store::sqlite` wraps a single `Mutex<Connection>`.
//! Foreign keys cascade `MediaFile -> Transcription -> Chunk`, and link-row tables
//! cascade from their owning `Transcription`. There is no ANN index on
//! `Chunk.embedding` here (see `search` module docs) — nearest-neighbour ranking
//! is a brute-force cosine scan in application code, same substitution the
//! teacher's own `SqliteVectorStore` documents for "production use cases with
//! large datasets".

pub mod chunk;
pub mod collection;
pub mod job;
pub mod media;
pub mod models;
pub mod search;
pub mod topic;
pub mod transcription;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS media_files (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    stored_path TEXT NOT NULL,
    display_name TEXT NOT NULL,
    byte_size INTEGER NOT NULL,
    mime TEXT,
    duration_seconds REAL,
    content_hash TEXT NOT NULL,
    origin TEXT NOT NULL,
    origin_url TEXT,
    origin_platform TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(owner_id, content_hash)
);
CREATE INDEX IF NOT EXISTS idx_media_files_owner ON media_files(owner_id);

CREATE TABLE IF NOT EXISTS transcriptions (
    id TEXT PRIMARY KEY,
    media_file_id TEXT NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    full_text TEXT NOT NULL DEFAULT '',
    segments TEXT NOT NULL DEFAULT '[]',
    language TEXT,
    model_name TEXT,
    model_version TEXT,
    avg_confidence REAL,
    processing_seconds REAL,
    status TEXT NOT NULL,
    error_text TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transcriptions_media_file ON transcriptions(media_file_id);
CREATE INDEX IF NOT EXISTS idx_transcriptions_owner ON transcriptions(owner_id);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    transcription_id TEXT NOT NULL REFERENCES transcriptions(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_s REAL,
    end_s REAL,
    start_char INTEGER,
    end_char INTEGER,
    topic_summary TEXT,
    keywords TEXT,
    confidence REAL,
    embedding BLOB,
    UNIQUE(transcription_id, chunk_index)
);
CREATE INDEX IF NOT EXISTS idx_chunks_transcription ON chunks(transcription_id);

CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    parent_id TEXT REFERENCES topics(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT,
    is_public INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_id);

CREATE TABLE IF NOT EXISTS transcription_topics (
    transcription_id TEXT NOT NULL REFERENCES transcriptions(id) ON DELETE CASCADE,
    topic_id TEXT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    ai_confidence REAL,
    ai_reasoning TEXT,
    assigned_by TEXT,
    user_reviewed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (transcription_id, topic_id)
);

CREATE TABLE IF NOT EXISTS transcription_collections (
    transcription_id TEXT NOT NULL REFERENCES transcriptions(id) ON DELETE CASCADE,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    position INTEGER,
    assigned_by TEXT,
    PRIMARY KEY (transcription_id, collection_id)
);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    error_text TEXT,
    media_file_id TEXT,
    transcription_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id);
"#;

/// Handle to the metadata store. Each repository method acquires the lock,
/// does its work, and releases it — mirroring the "no DB handle held across
/// a network call" discipline of §5, since SQLite serializes writers anyway.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
