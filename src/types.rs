//! Core data types shared across the indexing pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::vector::Score;

/// Classification of an extracted chunk.
///
/// The extractor decides the kind; the index only carries it through to
/// search results and statistics. Scoring is pure cosine and ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Source code spans
    Code,
    /// Prose documentation (markdown, plain text)
    Doc,
    /// Configuration and manifest files
    Config,
}

impl ChunkKind {
    /// Relative importance weight, used for statistics only.
    #[must_use]
    pub fn importance_weight(&self) -> f32 {
        match self {
            Self::Code => 1.0,
            Self::Doc => 0.8,
            Self::Config => 0.6,
        }
    }

    /// Stable lowercase name for display and serialization.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Doc => "doc",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous, semantically meaningful span of source text treated as one
/// indexable unit.
///
/// Chunks are produced by a [`crate::chunking::ChunkExtractor`] during
/// indexing and superseded wholesale when their file is reindexed.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Stable identifier, unique within a project
    pub id: String,
    /// The exact text that gets embedded
    pub content: String,
    /// File the chunk came from
    pub file_path: PathBuf,
    /// First line of the span (1-based)
    pub start_line: u32,
    /// Last line of the span (1-based, inclusive)
    pub end_line: u32,
    /// Kind tag assigned by the extractor
    pub kind: ChunkKind,
    /// UTC timestamp of the source file's last modification
    pub last_modified_utc: u64,
    /// Importance weight derived from the kind
    pub weight: f32,
}

/// One hit returned from a semantic search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub file_path: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub score: Score,
    pub chunk_kind: ChunkKind,
}
