//! Durable tier of the embedding cache.
//!
//! One bincode-encoded file per entry under the cache directory, named by
//! the cache key. Writes go through a temp file and an atomic rename so a
//! crash never leaves a torn entry; concurrent writers of the same key
//! last-write-win, which is harmless because the payload is deterministic
//! for a given key.
//!
//! Failure semantics are deliberately soft: a failed read is a cache miss
//! (the embedding is recomputed), a failed write is logged and the
//! surrounding indexing operation continues.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// File extension for cache entry files.
const ENTRY_EXT: &str = "emb";

/// On-disk payload for one memoized embedding.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    model: String,
    kind: String,
    created_utc: u64,
    embedding: Vec<f32>,
}

#[derive(Debug)]
pub(crate) struct PersistentTier {
    dir: PathBuf,
}

impl PersistentTier {
    /// Create the tier, making the directory if needed.
    ///
    /// Directory creation failure is logged, not fatal: every later write
    /// will fail softly and reads will miss.
    pub(crate) fn new(dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(
                "failed to create embedding cache directory {}: {e}",
                dir.display()
            );
        }
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }

    /// Read an entry; any failure is a miss.
    pub(crate) fn read(&self, key: &str, model: &str) -> Option<Vec<f32>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!("cache read failed for {}, treating as miss: {e}", path.display());
                return None;
            }
        };

        match bincode::serde::decode_from_slice::<StoredEntry, _>(&bytes, bincode::config::standard())
        {
            Ok((entry, _)) if entry.model == model => Some(entry.embedding),
            Ok((entry, _)) => {
                debug!(
                    "cache entry {} was written by model '{}', treating as miss",
                    path.display(),
                    entry.model
                );
                None
            }
            Err(e) => {
                debug!("cache entry {} is corrupt, treating as miss: {e}", path.display());
                None
            }
        }
    }

    /// Write an entry; failures are logged and swallowed.
    pub(crate) fn write(&self, key: &str, model: &str, kind: &str, embedding: &[f32]) {
        let entry = StoredEntry {
            model: model.to_string(),
            kind: kind.to_string(),
            created_utc: chrono::Utc::now().timestamp() as u64,
            embedding: embedding.to_vec(),
        };

        let bytes = match bincode::serde::encode_to_vec(&entry, bincode::config::standard()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode cache entry {key}: {e}");
                return;
            }
        };

        let path = self.entry_path(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        if let Err(e) = fs::write(&tmp, &bytes) {
            warn!("failed to write cache entry {}: {e}", path.display());
            return;
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            warn!("failed to commit cache entry {}: {e}", path.display());
            let _ = fs::remove_file(&tmp);
        }
    }

    /// Remove entries whose file modification time is older than `max_age`.
    ///
    /// This is the only path that removes persisted entries.
    pub(crate) fn purge_older_than(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot list cache directory {}: {e}", self.dir.display());
                return 0;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified());
            let expired = match modified {
                Ok(modified) => now
                    .duration_since(modified)
                    .map(|age| age >= max_age)
                    .unwrap_or(false),
                Err(_) => false,
            };
            if expired {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("failed to purge cache entry {}: {e}", path.display()),
                }
            }
        }
        removed
    }

    /// Entry count and total byte size of the tier.
    pub(crate) fn stats(&self) -> (usize, u64) {
        let mut entries = 0;
        let mut bytes = 0;
        if let Ok(dir) = fs::read_dir(&self.dir) {
            for entry in dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                    continue;
                }
                entries += 1;
                bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        (entries, bytes)
    }
}
