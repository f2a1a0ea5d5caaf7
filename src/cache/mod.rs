//! Two-tier embedding cache that deduplicates provider calls.
//!
//! Lookups check a bounded hot map first and fall through to a durable
//! per-entry file store; persisted hits are promoted into the hot tier.
//! Keys are derived from the exact text being embedded (SHA-256, URL-safe
//! base64), the embedding kind, and the model id — the project scope is
//! the cache directory itself, which lives under the project's data dir.
//!
//! Entries persist indefinitely by design: recomputing an embedding costs
//! real provider work, so the persisted tier is never bulk-cleared. The
//! only removal path is the explicit age-based purge.

mod hot;
mod persistent;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use hot::HotTier;
use persistent::PersistentTier;

/// Whether an embedding was computed for a stored document or a query.
///
/// Providers embed the two differently (instruction prefixes, pooling), so
/// the kind is part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingKind {
    Document,
    Query,
}

impl EmbeddingKind {
    /// Stable short name used in cache keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "doc",
            Self::Query => "query",
        }
    }
}

/// SHA-256 digest of exact text content, URL-safe base64 encoded.
///
/// No semantic normalization is performed: two texts share a hash only if
/// they are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the exact bytes of `text`.
    #[must_use]
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    /// The encoded digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Size report for the persisted tier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Two-tier (persisted + hot) embedding cache for one project and model.
#[derive(Debug)]
pub struct EmbeddingCache {
    hot: HotTier,
    disk: PersistentTier,
    model: String,
    model_tag: String,
}

impl EmbeddingCache {
    /// Open (or create) the cache under `dir` for the given model id.
    pub fn new(dir: PathBuf, model: &str, hot_capacity: usize) -> Self {
        Self {
            hot: HotTier::new(hot_capacity),
            disk: PersistentTier::new(dir),
            model: model.to_string(),
            model_tag: sanitize_model_tag(model),
        }
    }

    fn key(&self, hash: &ContentHash, kind: EmbeddingKind) -> String {
        format!("{}-{}-{}", hash.as_str(), kind.as_str(), self.model_tag)
    }

    /// Look up a memoized embedding.
    ///
    /// Hot-tier hits refresh recency; persisted-tier hits are promoted
    /// into the hot tier. A persisted read failure is a miss.
    pub fn get(&self, hash: &ContentHash, kind: EmbeddingKind) -> Option<Vec<f32>> {
        let key = self.key(hash, kind);

        if let Some(embedding) = self.hot.get(&key) {
            return Some(embedding.as_ref().clone());
        }

        let embedding = self.disk.read(&key, &self.model)?;
        let shared = Arc::new(embedding);
        self.hot.insert(&key, Arc::clone(&shared));
        Some(shared.as_ref().clone())
    }

    /// Store an embedding in both tiers.
    pub fn put(&self, hash: &ContentHash, embedding: &[f32], kind: EmbeddingKind) {
        let key = self.key(hash, kind);
        self.disk.write(&key, &self.model, kind.as_str(), embedding);
        self.hot.insert(&key, Arc::new(embedding.to_vec()));
    }

    /// Remove persisted entries older than `max_age`. Returns the count.
    ///
    /// The hot tier is dropped wholesale afterwards so it cannot serve
    /// entries the sweep removed.
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        let removed = self.disk.purge_older_than(max_age);
        if removed > 0 {
            self.hot.clear();
        }
        removed
    }

    /// Persisted-tier size report.
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = self.disk.stats();
        CacheStats { entries, bytes }
    }

    /// Intentionally a no-op.
    ///
    /// Bulk-clearing the persisted tier would discard paid provider
    /// computation; the only sanctioned removal is `purge_older_than`.
    pub fn clear_project(&self) {
        warn!(
            "clear_project is disabled by policy: persisted embeddings are never bulk-cleared; \
             use purge_older_than for bounded removal"
        );
    }

    /// Number of entries currently resident in the hot tier.
    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }
}

/// Reduce a model id to filesystem-safe characters for cache keys.
fn sanitize_model_tag(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
