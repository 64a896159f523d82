//! File-based history backend: append-only JSON-lines storage.
//!
//! Three files under one directory, one JSON object per line:
//! - `interactions.jsonl`: `InteractionRecord`s
//! - `embeddings.jsonl`: `EmbeddingRecord`s
//! - `notes.jsonl`: `ProviderNote`s, where a later line replaces an earlier
//!   one in the same slot
//!
//! Records are loaded into memory on creation. Every append writes exactly
//! one line to disk before the record becomes visible to readers, so a
//! failed write is never observed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use switchyard_core::{EmbeddingRecord, HistoryBackend, HistoryFilter, InteractionRecord, MemoryError, ProviderNote};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::in_memory::{select, select_notes, upsert_note};

const INTERACTIONS_FILE: &str = "interactions.jsonl";
const EMBEDDINGS_FILE: &str = "embeddings.jsonl";
const NOTES_FILE: &str = "notes.jsonl";

pub struct FileHistory {
    dir: PathBuf,
    interactions: RwLock<Vec<InteractionRecord>>,
    embeddings: RwLock<Vec<EmbeddingRecord>>,
    notes: RwLock<Vec<ProviderNote>>,
}

impl FileHistory {
    /// Open (or lazily create) a history directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let interactions: Vec<InteractionRecord> = load_lines(&dir.join(INTERACTIONS_FILE));
        let embeddings: Vec<EmbeddingRecord> = load_lines(&dir.join(EMBEDDINGS_FILE));
        let mut notes = Vec::new();
        for note in load_lines::<ProviderNote>(&dir.join(NOTES_FILE)) {
            upsert_note(&mut notes, note);
        }
        debug!(
            path = %dir.display(),
            interactions = interactions.len(),
            embeddings = embeddings.len(),
            notes = notes.len(),
            "File history backend loaded"
        );
        Self {
            dir,
            interactions: RwLock::new(interactions),
            embeddings: RwLock::new(embeddings),
            notes: RwLock::new(notes),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_line<T: Serialize>(&self, file: &str, record: &T) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| MemoryError::Storage(format!("Failed to create history directory: {e}")))?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize record: {e}")))?;
        line.push('\n');

        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .map_err(|e| MemoryError::Storage(format!("Failed to open {file}: {e}")))?;
        handle
            .write_all(line.as_bytes())
            .map_err(|e| MemoryError::Storage(format!("Failed to append to {file}: {e}")))
    }
}

/// Load records from a JSONL file, skipping corrupted lines.
fn load_lines<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted history line");
                None
            }
        })
        .collect()
}

#[async_trait]
impl HistoryBackend for FileHistory {
    fn name(&self) -> &str {
        "file"
    }

    async fn append_interaction(&self, mut record: InteractionRecord) -> Result<u64, MemoryError> {
        let mut rows = self.interactions.write().await;
        record.seq = rows.last().map_or(0, |r| r.seq) + 1;
        self.append_line(INTERACTIONS_FILE, &record)?;
        let seq = record.seq;
        rows.push(record);
        Ok(seq)
    }

    async fn interactions(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<InteractionRecord>, MemoryError> {
        Ok(select(&self.interactions.read().await, filter, user_id))
    }

    async fn append_embedding(&self, mut record: EmbeddingRecord) -> Result<u64, MemoryError> {
        let mut rows = self.embeddings.write().await;
        record.seq = rows.last().map_or(0, |r| r.seq) + 1;
        self.append_line(EMBEDDINGS_FILE, &record)?;
        let seq = record.seq;
        rows.push(record);
        Ok(seq)
    }

    async fn embeddings(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<EmbeddingRecord>, MemoryError> {
        Ok(select(&self.embeddings.read().await, filter, user_id))
    }

    async fn put_note(&self, note: ProviderNote) -> Result<(), MemoryError> {
        let mut notes = self.notes.write().await;
        self.append_line(NOTES_FILE, &note)?;
        upsert_note(&mut notes, note);
        Ok(())
    }

    async fn notes(&self, provider_id: &str, user_id: Option<&str>, limit: usize) -> Result<Vec<ProviderNote>, MemoryError> {
        Ok(select_notes(&self.notes.read().await, provider_id, user_id, limit))
    }
}
