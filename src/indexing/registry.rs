//! Multi-project registry of independent indexes.
//!
//! Each project gets its own index, cache, and indexer; nothing is
//! shared across projects. Searches go straight to the project's
//! published snapshot and never take the indexer lock, so queries stay
//! responsive while a reindex pass runs.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::Settings;
use crate::cache::{CacheStats, EmbeddingCache};
use crate::embedding::{CachedEmbedder, EmbeddingProvider, FastEmbedProvider, RetryPolicy};
use crate::error::{IndexError, IndexResult};
use crate::types::SearchResult;
use crate::vector::{VectorDimension, VectorIndex, VectorPrecision};

use super::indexer::IncrementalIndexer;
use super::monitor::ReindexTarget;
use super::progress::{IndexStats, ProgressSender};

/// Point-in-time size report for one project.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProjectStats {
    pub chunk_count: usize,
    pub file_count: usize,
    pub memory_usage_mb: f64,
    pub dimension: usize,
    pub precision: VectorPrecision,
    pub cache: CacheStats,
}

/// One project's index, embedder, and indexer.
pub struct ProjectHandle {
    name: String,
    index: Arc<VectorIndex>,
    embedder: Arc<CachedEmbedder>,
    indexer: Mutex<IncrementalIndexer>,
}

impl ProjectHandle {
    /// Open a project with the configured fastembed provider.
    pub fn open(settings: Arc<Settings>, name: &str, root: &Path) -> IndexResult<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match settings.embedding.provider.as_str() {
            "fastembed" => Arc::new(
                FastEmbedProvider::new(&settings.embedding.model, &settings.models_dir())
                    .map_err(IndexError::Provider)?,
            ),
            other => {
                return Err(IndexError::ConfigError {
                    reason: format!(
                        "unknown embedding provider '{other}'; supported: fastembed"
                    ),
                });
            }
        };
        Self::with_provider(settings, name, root, provider)
    }

    /// Open a project with an explicit provider.
    pub fn with_provider(
        settings: Arc<Settings>,
        name: &str,
        root: &Path,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> IndexResult<Self> {
        let dimension = provider.dimension();
        let index = Arc::new(VectorIndex::new(
            dimension,
            settings.embedding.precision,
            settings.search.max_threads,
        )?);

        // Records and the cache both live under the data dir
        let data_dir = Settings::data_dir_for(root);
        fs::create_dir_all(&data_dir).map_err(|e| IndexError::FileWrite {
            path: data_dir.clone(),
            source: e,
        })?;

        let cache = EmbeddingCache::new(
            data_dir.join("cache"),
            provider.model_id(),
            settings.cache.hot_capacity,
        );
        let retry = RetryPolicy {
            max_attempts: settings.embedding.retry.max_attempts,
            base_delay: settings.embedding.retry.base_delay(),
            max_delay: settings.embedding.retry.max_delay(),
            overall_deadline: settings.embedding.retry.overall_deadline(),
        };
        let embedder = Arc::new(CachedEmbedder::new(provider, cache, retry));

        let indexer = IncrementalIndexer::new(
            Arc::clone(&settings),
            root.to_path_buf(),
            Arc::clone(&index),
            Arc::clone(&embedder),
        )?;

        Ok(Self {
            name: name.to_string(),
            index,
            embedder,
            indexer: Mutex::new(indexer),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one indexing pass over the project root.
    pub fn reindex(&self, force: bool, progress: &ProgressSender) -> IndexResult<IndexStats> {
        self.indexer.lock().index_directory(force, progress)
    }

    /// Search the published snapshot.
    ///
    /// Safe to call while a reindex pass is in flight; results come from
    /// the last committed snapshot.
    pub fn search(&self, query: &str, limit: usize) -> IndexResult<Vec<SearchResult>> {
        let embedding = self
            .embedder
            .embed_query(query)
            .map_err(IndexError::Provider)?;
        Ok(self.index.search(&embedding, limit)?)
    }

    /// Drop the project's entries and records, keeping the cache.
    pub fn clear(&self) {
        self.indexer.lock().clear();
    }

    #[must_use]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<CachedEmbedder> {
        &self.embedder
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.index.dimension()
    }

    /// Size report over the published snapshot and the persisted cache.
    #[must_use]
    pub fn stats(&self) -> ProjectStats {
        ProjectStats {
            chunk_count: self.index.entry_count(),
            file_count: self.index.file_count(),
            memory_usage_mb: self.index.memory_usage_bytes() as f64 / (1024.0 * 1024.0),
            dimension: self.index.dimension().get(),
            precision: self.index.precision(),
            cache: self.embedder.cache().stats(),
        }
    }
}

impl ReindexTarget for ProjectHandle {
    fn reindex(&self) -> IndexResult<IndexStats> {
        ProjectHandle::reindex(self, false, &ProgressSender::disabled())
    }
}

/// Registry mapping project names to handles.
#[derive(Default)]
pub struct IndexerRegistry {
    projects: Mutex<HashMap<String, Arc<ProjectHandle>>>,
}

impl IndexerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any previous one under the name.
    pub fn insert(&self, handle: Arc<ProjectHandle>) {
        let name = handle.name().to_string();
        info!("registered project '{name}'");
        self.projects.lock().insert(name, handle);
    }

    /// Look up a project by name.
    pub fn get(&self, name: &str) -> IndexResult<Arc<ProjectHandle>> {
        self.projects
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| IndexError::ProjectNotFound {
                name: name.to_string(),
            })
    }

    /// Deregister a project, returning its handle if present.
    pub fn remove(&self, name: &str) -> Option<Arc<ProjectHandle>> {
        self.projects.lock().remove(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.projects.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every handle. In-flight searches finish on their snapshot
    /// clones; new lookups fail with `ProjectNotFound`.
    pub fn shutdown(&self) {
        let count = {
            let mut projects = self.projects.lock();
            let count = projects.len();
            projects.clear();
            count
        };
        info!("registry shut down, {count} projects released");
    }
}
