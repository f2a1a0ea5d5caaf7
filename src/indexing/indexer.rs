//! Incremental indexing driven by content-hash change detection.
//!
//! Each run walks the tree, classifies every file as added, modified,
//! removed, or unchanged against the persisted records, and re-embeds
//! only what changed. Per-file failures (unreadable files, exhausted
//! transient embedding retries) skip the file and are counted; fatal
//! provider errors abort the run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::Settings;
use crate::chunking::{ChunkExtractor, SpanChunker};
use crate::embedding::CachedEmbedder;
use crate::error::{IndexError, IndexResult};
use crate::vector::{EmbeddingData, VectorEntry, VectorIndex};

use super::file_info::{FileRecord, utc_now};
use super::progress::{ChangeSummary, IndexStats, ProgressEvent, ProgressSender};
use super::walker::FileWalker;

const RECORDS_FILE: &str = "files.json";

struct PendingFile {
    path: PathBuf,
    content: String,
    last_modified_utc: u64,
}

/// Hash-diffing indexer for one project root.
pub struct IncrementalIndexer {
    settings: Arc<Settings>,
    root: PathBuf,
    records: HashMap<PathBuf, FileRecord>,
    index: Arc<VectorIndex>,
    embedder: Arc<CachedEmbedder>,
    chunker: SpanChunker,
    walker: FileWalker,
}

impl IncrementalIndexer {
    /// Create an indexer for `root`, loading persisted file records.
    ///
    /// Missing records mean a fresh project; a corrupt records file is
    /// discarded with a warning. Any other read failure is an error.
    pub fn new(
        settings: Arc<Settings>,
        root: PathBuf,
        index: Arc<VectorIndex>,
        embedder: Arc<CachedEmbedder>,
    ) -> IndexResult<Self> {
        let records = load_records(&records_path(&root))?;
        let chunker = SpanChunker::new(settings.indexing.chunk_max_lines);
        let walker = FileWalker::new(Arc::clone(&settings));
        Ok(Self {
            settings,
            root,
            records,
            index,
            embedder,
            chunker,
            walker,
        })
    }

    /// Run one indexing pass.
    ///
    /// With `force`, every discovered file is re-embedded regardless of
    /// its recorded hash; the embedding cache still deduplicates unchanged
    /// content, so a forced pass is cheap when nothing actually changed.
    /// Exactly one terminal progress event is emitted.
    pub fn index_directory(
        &mut self,
        force: bool,
        progress: &ProgressSender,
    ) -> IndexResult<IndexStats> {
        match self.run(force, progress) {
            Ok(stats) => {
                progress.send(ProgressEvent::Completed);
                Ok(stats)
            }
            Err(e) => {
                progress.send(ProgressEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run(&mut self, force: bool, progress: &ProgressSender) -> IndexResult<IndexStats> {
        let started = Instant::now();
        let mut stats = IndexStats::default();
        let mut changes = ChangeSummary::default();

        // The in-memory index starts empty after a restart even when the
        // file records are warm. Recorded-unchanged files then still need
        // re-chunking and re-embedding to repopulate it; the cache serves
        // their embeddings, so no provider work is repeated.
        let repopulate = !force && self.index.entry_count() == 0 && !self.records.is_empty();
        if repopulate {
            debug!("index is empty with {} warm records, repopulating", self.records.len());
        }

        // Scan phase: walk, hash, classify
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut pending: Vec<PendingFile> = Vec::new();
        let mut discovered = 0usize;

        for path in self.walker.walk(&self.root) {
            discovered += 1;
            progress.send(ProgressEvent::Scanning { discovered });
            seen.insert(path.clone());

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping unreadable file {}: {e}", path.display());
                    stats.files_skipped += 1;
                    continue;
                }
            };

            let changed = match self.records.get(&path) {
                Some(record) if !force && !record.has_changed(&content) => {
                    changes.unchanged += 1;
                    repopulate
                }
                Some(_) => {
                    changes.modified.push(path.clone());
                    true
                }
                None => {
                    changes.added.push(path.clone());
                    true
                }
            };

            if changed {
                let last_modified_utc = mtime_secs(&path);
                pending.push(PendingFile {
                    path,
                    content,
                    last_modified_utc,
                });
            }
        }

        // Files that vanished since the last run
        changes.removed = self
            .records
            .keys()
            .filter(|p| !seen.contains(*p))
            .cloned()
            .collect();
        for path in &changes.removed {
            self.index.remove_entries_for_file(path);
            self.records.remove(path);
        }

        // Stale entries for modified files are replaced wholesale
        for path in &changes.modified {
            self.index.remove_entries_for_file(path);
        }

        // Chunk phase
        let mut chunks = Vec::new();
        let mut chunk_counts = vec![0usize; pending.len()];
        for (file_idx, file) in pending.iter().enumerate() {
            let extracted =
                self.chunker
                    .extract(&file.path, &file.content, file.last_modified_utc);
            chunk_counts[file_idx] = extracted.len();
            chunks.extend(extracted.into_iter().map(|c| (file_idx, c)));
        }

        // Embedding phase, batched through the cache
        let total = chunks.len();
        let precision = self.index.precision();
        let mut failed_files: HashSet<usize> = HashSet::new();
        let mut done = 0usize;

        for batch in chunks.chunks(self.settings.indexing.batch_size.max(1)) {
            let live: Vec<&(usize, crate::types::Chunk)> = batch
                .iter()
                .filter(|(file_idx, _)| !failed_files.contains(file_idx))
                .collect();
            done += batch.len();
            if live.is_empty() {
                continue;
            }

            let texts: Vec<&str> = live.iter().map(|(_, c)| c.content.as_str()).collect();
            match self.embedder.embed_documents(&texts) {
                Ok(embeddings) => {
                    for ((file_idx, chunk), embedding) in live.iter().zip(embeddings) {
                        debug_assert!(!failed_files.contains(file_idx));
                        self.index.add_entry(VectorEntry {
                            id: chunk.id.clone(),
                            file_path: chunk.file_path.clone(),
                            start_line: chunk.start_line,
                            end_line: chunk.end_line,
                            content: chunk.content.clone(),
                            embedding: EmbeddingData::encode(&embedding, precision),
                            kind: chunk.kind,
                            last_modified_utc: chunk.last_modified_utc,
                        })?;
                        stats.chunks_created += 1;
                    }
                }
                Err(e) if e.is_retryable() => {
                    // Retries are exhausted; skip the affected files and move on
                    warn!("embedding batch failed after retries, skipping its files: {e}");
                    for (file_idx, _) in &live {
                        failed_files.insert(*file_idx);
                    }
                }
                Err(e) => return Err(IndexError::Provider(e)),
            }
            progress.send(ProgressEvent::Embedding {
                current: done.min(total),
                total,
            });
        }

        // Roll back partial work for files whose batches failed
        for &file_idx in &failed_files {
            let file = &pending[file_idx];
            let dropped = self.index.remove_entries_for_file(&file.path);
            stats.chunks_created -= dropped;
            stats.chunks_skipped += chunk_counts[file_idx];
            stats.files_skipped += 1;
            self.records.remove(&file.path);
        }

        for (file_idx, file) in pending.iter().enumerate() {
            if failed_files.contains(&file_idx) {
                continue;
            }
            self.records
                .insert(file.path.clone(), FileRecord::new(file.path.clone(), &file.content));
            stats.files_processed += 1;
        }

        // Commit phase: publish a fresh snapshot and persist records
        progress.send(ProgressEvent::Committing);
        if force || repopulate || !changes.is_empty() {
            self.index.build();
        }
        self.save_records();

        stats.elapsed = started.elapsed();
        stats.changes = changes;
        info!(
            "indexed {} in {:.2}s: {} processed, {} unchanged, {} removed, {} skipped",
            self.root.display(),
            stats.elapsed.as_secs_f64(),
            stats.files_processed,
            stats.changes.unchanged,
            stats.changes.removed.len(),
            stats.files_skipped,
        );
        Ok(stats)
    }

    /// Drop all entries and records. The embedding cache is untouched.
    pub fn clear(&mut self) {
        self.index.clear();
        self.records.clear();
        self.save_records();
    }

    /// Number of files currently recorded as indexed.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The project root this indexer covers.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn save_records(&self) {
        let path = records_path(&self.root);
        if let Some(parent) = path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!("cannot create {}: {e}", parent.display());
            return;
        }
        let records: Vec<&FileRecord> = self.records.values().collect();
        match serde_json::to_string_pretty(&records) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("failed to persist file records to {}: {e}", path.display());
                }
            }
            Err(e) => warn!("failed to serialize file records: {e}"),
        }
    }
}

fn records_path(root: &Path) -> PathBuf {
    Settings::data_dir_for(root).join(RECORDS_FILE)
}

fn load_records(path: &Path) -> IndexResult<HashMap<PathBuf, FileRecord>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => {
            return Err(IndexError::FileRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    match serde_json::from_str::<Vec<FileRecord>>(&json) {
        Ok(records) => {
            debug!("loaded {} file records from {}", records.len(), path.display());
            Ok(records.into_iter().map(|r| (r.path.clone(), r)).collect())
        }
        Err(e) => {
            // A corrupt records file just means a full re-embed next run
            warn!("discarding corrupt file records at {}: {e}", path.display());
            Ok(HashMap::new())
        }
    }
}

fn mtime_secs(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or_else(utc_now, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::embedding::{EmbeddingProvider, ProviderError, RetryPolicy};
    use crate::vector::{VectorDimension, VectorPrecision};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct HashProvider {
        calls: AtomicUsize,
    }

    impl HashProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn embed_one(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += f32::from(b);
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            v
        }
    }

    impl EmbeddingProvider for HashProvider {
        fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(Self::embed_one(text))
        }

        fn dimension(&self) -> VectorDimension {
            VectorDimension::new(8).unwrap()
        }

        fn model_id(&self) -> &str {
            "hash-test-model"
        }
    }

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        index: Arc<VectorIndex>,
        provider: Arc<HashProvider>,
        indexer: IncrementalIndexer,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        let mut settings = Settings::default();
        settings.indexing.extensions = vec!["rs".to_string()];
        settings.indexing.batch_size = 4;
        let settings = Arc::new(settings);

        let index = Arc::new(
            VectorIndex::new(VectorDimension::new(8).unwrap(), VectorPrecision::Full, 2).unwrap(),
        );
        let provider = Arc::new(HashProvider::new());
        let cache = EmbeddingCache::new(
            Settings::data_dir_for(&root).join("cache"),
            "hash-test-model",
            64,
        );
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            overall_deadline: Duration::from_secs(5),
        };
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            cache,
            retry,
        ));

        let indexer = IncrementalIndexer::new(
            settings,
            root.clone(),
            Arc::clone(&index),
            Arc::clone(&embedder),
        )
        .unwrap();
        Fixture {
            _temp: temp,
            root,
            index,
            provider,
            indexer,
        }
    }

    #[test]
    fn test_initial_run_indexes_everything() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n\nfn a2() {}\n").unwrap();
        fs::write(fx.root.join("b.rs"), "fn b() {}\n").unwrap();

        let stats = fx
            .indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.changes.added.len(), 2);
        assert_eq!(stats.chunks_created, 3);
        assert_eq!(fx.index.entry_count(), 3);
    }

    #[test]
    fn test_unchanged_files_are_not_reembedded() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();

        fx.indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();
        let calls_after_first = fx.provider.calls.load(Ordering::SeqCst);

        let stats = fx
            .indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        assert_eq!(stats.changes.unchanged, 1);
        assert_eq!(stats.files_processed, 0);
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[test]
    fn test_modified_file_is_isolated() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();
        fs::write(fx.root.join("b.rs"), "fn b() {}\n").unwrap();
        fx.indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        fs::write(fx.root.join("a.rs"), "fn a() { changed(); }\n").unwrap();
        let stats = fx
            .indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        assert_eq!(stats.changes.modified, vec![fx.root.join("a.rs")]);
        assert!(stats.changes.added.is_empty());
        assert_eq!(stats.changes.unchanged, 1);
    }

    #[test]
    fn test_removed_file_entries_are_dropped() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();
        fs::write(fx.root.join("b.rs"), "fn b() {}\n").unwrap();
        fx.indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();
        assert_eq!(fx.index.entry_count(), 2);

        fs::remove_file(fx.root.join("b.rs")).unwrap();
        let stats = fx
            .indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        assert_eq!(stats.changes.removed, vec![fx.root.join("b.rs")]);
        assert_eq!(fx.index.entry_count(), 1);
        assert_eq!(fx.indexer.record_count(), 1);
    }

    #[test]
    fn test_force_reindexes_but_cache_absorbs_provider_calls() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();
        fx.indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();
        let calls = fx.provider.calls.load(Ordering::SeqCst);

        let stats = fx
            .indexer
            .index_directory(true, &ProgressSender::disabled())
            .unwrap();

        assert_eq!(stats.changes.modified.len(), 1);
        assert_eq!(stats.files_processed, 1);
        // Identical content: the cache serves every embedding
        assert_eq!(fx.provider.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_restart_repopulates_index_from_records_and_cache() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();
        fx.indexer
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        // Fresh indexer over the same root: records are warm but the
        // in-memory index starts empty, as after a process restart
        let mut settings = Settings::default();
        settings.indexing.extensions = vec!["rs".to_string()];
        let settings = Arc::new(settings);
        let index = Arc::new(
            VectorIndex::new(VectorDimension::new(8).unwrap(), VectorPrecision::Full, 2).unwrap(),
        );
        let cache = EmbeddingCache::new(
            Settings::data_dir_for(&fx.root).join("cache"),
            "hash-test-model",
            64,
        );
        let provider = Arc::new(HashProvider::new());
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            cache,
            RetryPolicy::default(),
        ));
        let mut restarted = IncrementalIndexer::new(
            settings,
            fx.root.clone(),
            Arc::clone(&index),
            embedder,
        )
        .unwrap();

        assert_eq!(restarted.record_count(), 1);
        let stats = restarted
            .index_directory(false, &ProgressSender::disabled())
            .unwrap();

        // Unchanged files are re-chunked and the index is rebuilt, but
        // every embedding comes out of the persisted cache
        assert_eq!(stats.changes.unchanged, 1);
        assert_eq!(index.entry_count(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_terminal_progress_event_is_sent() {
        let mut fx = fixture();
        fs::write(fx.root.join("a.rs"), "fn a() {}\n").unwrap();

        let (tx, rx) = ProgressSender::channel();
        fx.indexer.index_directory(false, &tx).unwrap();
        drop(tx);

        let events: Vec<_> = rx.iter().collect();
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(*terminal[0], ProgressEvent::Completed);
        assert!(events.last().unwrap().is_terminal());
    }
}
