//! Hash-based tracking of indexed files.
//!
//! Change detection is content-driven: a file counts as modified only
//! when its SHA-256 digest differs from the recorded one, regardless of
//! mtime churn from checkouts or touch.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::ContentHash;

/// Per-file record persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// SHA-256 of the file content at last index time, URL-safe base64
    /// encoded (the same encoding the embedding cache keys use).
    pub hash: String,
    /// UTC seconds since UNIX_EPOCH when last indexed.
    pub last_indexed_utc: u64,
}

impl FileRecord {
    /// Record a file as indexed right now.
    pub fn new(path: PathBuf, content: &str) -> Self {
        Self {
            path,
            hash: ContentHash::of(content).as_str().to_string(),
            last_indexed_utc: utc_now(),
        }
    }

    /// Whether `content` differs from what was indexed.
    #[must_use]
    pub fn has_changed(&self, content: &str) -> bool {
        self.hash != ContentHash::of(content).as_str()
    }
}

/// Current UTC timestamp in seconds since UNIX_EPOCH.
#[must_use]
pub fn utc_now() -> u64 {
    Utc::now().timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let a = FileRecord::new(PathBuf::from("t.rs"), "fn main() {}");
        let b = FileRecord::new(PathBuf::from("t.rs"), "fn main() {}");
        let c = FileRecord::new(PathBuf::from("t.rs"), "fn main() { }");

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        // 32 digest bytes, base64 without padding
        assert_eq!(a.hash.len(), 43);
    }

    #[test]
    fn test_record_change_detection() {
        let record = FileRecord::new(PathBuf::from("test.rs"), "fn main() {}");

        assert!(!record.has_changed("fn main() {}"));
        assert!(record.has_changed("fn main() { run(); }"));
    }

    #[test]
    fn test_utc_now_is_sane() {
        let ts = utc_now();
        // After Jan 1, 2020
        assert!(ts > 1_577_836_800);
    }
}
