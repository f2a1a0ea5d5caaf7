//! Embedding provider boundary and the cache-fronted embedder.
//!
//! Providers form a closed set of variants behind one capability trait,
//! chosen once at construction from configuration. Transient failures
//! (rate limits, 5xx, timeouts) are modeled as a distinct error class and
//! retried with exponential backoff; everything else fails immediately.

mod fastembed;

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{ContentHash, EmbeddingCache, EmbeddingKind};
use crate::vector::VectorDimension;

pub use fastembed::FastEmbedProvider;

/// Errors raised by embedding providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transient failure (HTTP 429/5xx, timeout). Eligible for retry.
    #[error(
        "Transient embedding provider failure: {reason}\nSuggestion: The operation is retried automatically; if it keeps failing, check provider status and rate limits"
    )]
    Transient { reason: String },

    /// Permanent failure (auth, bad request). Never retried.
    #[error(
        "Embedding provider rejected the request: {reason}\nSuggestion: Check credentials and request size limits"
    )]
    Fatal { reason: String },

    /// The provider returned vectors of an unexpected dimension.
    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: The configured model does not match the index; re-index with 'semdex index --force'"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

impl ProviderError {
    /// Whether the retry policy may attempt this operation again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Capability interface for turning text into fixed-dimension vectors.
///
/// Implementations must be thread-safe; batching is the caller's concern.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of document texts, one vector per input.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> VectorDimension;

    /// Stable model identifier, part of every cache key.
    fn model_id(&self) -> &str;
}

/// Exponential-backoff retry policy for transient provider failures.
///
/// Attempts are serialized: a batch is never retried concurrently with
/// itself. An overall deadline bounds the whole operation because batch
/// embedding of many chunks can legitimately take minutes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub overall_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            overall_deadline: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures until the attempt cap or the
    /// overall deadline is hit. The last error is surfaced unchanged.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable()
                    && attempt + 1 < self.max_attempts
                    && started.elapsed() < self.overall_deadline =>
                {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{what} failed (attempt {}/{}), retrying in {:?}: {e}",
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// An embedding provider fronted by the two-tier cache.
///
/// Byte-identical text is embedded at most once per (kind, model,
/// project); everything else is a cache hit.
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    retry: RetryPolicy,
}

impl CachedEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: EmbeddingCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            retry,
        }
    }

    /// Embed document texts, consulting the cache per text.
    ///
    /// Only cache misses reach the provider, in one batch call. The
    /// returned vectors are in input order.
    pub fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let hashes: Vec<ContentHash> = texts.iter().map(|t| ContentHash::of(t)).collect();

        let mut results: Vec<Option<Vec<f32>>> = hashes
            .iter()
            .map(|h| self.cache.get(h, EmbeddingKind::Document))
            .collect();

        let miss_indices: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();

        if !miss_indices.is_empty() {
            debug!(
                "embedding batch: {} texts, {} cache hits, {} provider calls",
                texts.len(),
                texts.len() - miss_indices.len(),
                miss_indices.len()
            );
            let miss_texts: Vec<&str> = miss_indices.iter().map(|&i| texts[i]).collect();
            let embeddings = self
                .retry
                .run("document embedding batch", || {
                    self.provider.embed_documents(&miss_texts)
                })?;

            if embeddings.len() != miss_texts.len() {
                return Err(ProviderError::Fatal {
                    reason: format!(
                        "provider returned {} embeddings for {} texts",
                        embeddings.len(),
                        miss_texts.len()
                    ),
                });
            }

            let expected = self.provider.dimension().get();
            for (&i, embedding) in miss_indices.iter().zip(embeddings) {
                if embedding.len() != expected {
                    return Err(ProviderError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                self.cache.put(&hashes[i], &embedding, EmbeddingKind::Document);
                results[i] = Some(embedding);
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.expect("every slot filled by cache or provider"))
            .collect())
    }

    /// Embed a query, tagged as a query (not a document) in the cache.
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let hash = ContentHash::of(text);
        if let Some(embedding) = self.cache.get(&hash, EmbeddingKind::Query) {
            return Ok(embedding);
        }

        let embedding = self
            .retry
            .run("query embedding", || self.provider.embed_query(text))?;

        let expected = self.provider.dimension().get();
        if embedding.len() != expected {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        self.cache.put(&hash, &embedding, EmbeddingKind::Query);
        Ok(embedding)
    }

    /// The cache behind this embedder.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Dimension of the underlying provider.
    pub fn dimension(&self) -> VectorDimension {
        self.provider.dimension()
    }

    /// Model id of the underlying provider.
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic provider that counts every call it serves.
    struct CountingProvider {
        dimension: VectorDimension,
        calls: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingProvider {
        fn new(dim: usize) -> Self {
            Self {
                dimension: VectorDimension::new(dim).unwrap(),
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing_first(dim: usize, failures: usize) -> Self {
            let p = Self::new(dim);
            p.fail_first.store(failures, Ordering::SeqCst);
            p
        }

        fn embed_one(&self, text: &str) -> Vec<f32> {
            let dim = self.dimension.get();
            let mut v = vec![0.0; dim];
            for (i, b) in text.bytes().enumerate() {
                v[i % dim] += b as f32;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            v
        }

        fn maybe_fail(&self) -> Result<(), ProviderError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(ProviderError::Transient {
                    reason: "simulated 503".to_string(),
                });
            }
            Ok(())
        }
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_fail()?;
            Ok(texts.iter().map(|t| self.embed_one(t)).collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_fail()?;
            Ok(self.embed_one(text))
        }

        fn dimension(&self) -> VectorDimension {
            self.dimension
        }

        fn model_id(&self) -> &str {
            "counting-test-model"
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            overall_deadline: Duration::from_secs(5),
        }
    }

    fn embedder(dir: &TempDir, provider: Arc<CountingProvider>) -> CachedEmbedder {
        let cache = EmbeddingCache::new(dir.path().to_path_buf(), provider.model_id(), 64);
        CachedEmbedder::new(provider, cache, fast_retry())
    }

    #[test]
    fn test_cache_idempotence() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new(8));
        let embedder = embedder(&dir, Arc::clone(&provider));

        let texts = ["fn alpha() {}", "fn beta() {}"];
        let first = embedder.embed_documents(&texts).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // Second and later calls produce zero provider calls
        let second = embedder.embed_documents(&texts).unwrap();
        let third = embedder.embed_documents(&texts).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_partial_batch_hits_only_embed_misses() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new(8));
        let embedder = embedder(&dir, Arc::clone(&provider));

        embedder.embed_documents(&["known text"]).unwrap();
        let out = embedder
            .embed_documents(&["known text", "novel text"])
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_query_and_document_kinds_are_distinct() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new(8));
        let embedder = embedder(&dir, Arc::clone(&provider));

        embedder.embed_documents(&["shared text"]).unwrap();
        embedder.embed_query("shared text").unwrap();

        // Same bytes, different kind: two provider calls
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        embedder.embed_query("shared text").unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::failing_first(8, 2));
        let embedder = embedder(&dir, Arc::clone(&provider));

        let out = embedder.embed_documents(&["text"]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_exhaust_into_transient_error() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::failing_first(8, 10));
        let embedder = embedder(&dir, Arc::clone(&provider));

        let err = embedder.embed_documents(&["text"]).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        struct FatalProvider;
        impl EmbeddingProvider for FatalProvider {
            fn embed_documents(&self, _: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
                Err(ProviderError::Fatal {
                    reason: "401 unauthorized".to_string(),
                })
            }
            fn embed_query(&self, _: &str) -> Result<Vec<f32>, ProviderError> {
                Err(ProviderError::Fatal {
                    reason: "401 unauthorized".to_string(),
                })
            }
            fn dimension(&self) -> VectorDimension {
                VectorDimension::new(8).unwrap()
            }
            fn model_id(&self) -> &str {
                "fatal"
            }
        }

        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().to_path_buf(), "fatal", 8);
        let embedder = CachedEmbedder::new(Arc::new(FatalProvider), cache, fast_retry());

        let err = embedder.embed_documents(&["text"]).unwrap_err();
        assert!(!err.is_retryable());
    }
}
