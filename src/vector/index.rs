//! In-memory brute-force vector index with parallel SIMD scanning.
//!
//! The index deliberately performs an exhaustive scan instead of building an
//! approximate graph or tree structure: per-project corpora are tens of
//! thousands of vectors, correctness (no missed matches) matters more than
//! asymptotic speed, and throughput comes from SIMD scoring plus a bounded
//! worker pool.
//!
//! # Storage layout
//! Each precision variant keeps its vectors in one flat, contiguous buffer
//! so a scan touches memory sequentially. `build()` finalizes the layout
//! into an immutable snapshot; searches clone the snapshot `Arc` under a
//! brief read lock and then scan lock-free, so a search never observes the
//! structure mid-mutation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use half::f16;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::types::{ChunkKind, SearchResult};
use crate::vector::simd;
use crate::vector::types::{EmbeddingData, Score, VectorDimension, VectorError, VectorPrecision};

/// Ranges per worker; finer than the thread count so stragglers rebalance.
const PARTITIONS_PER_THREAD: usize = 4;

/// The embedding and metadata backing one chunk inside the index.
///
/// Entries are owned exclusively by the index, inserted and removed in
/// lock-step with chunk lifecycle, and replaced wholesale rather than
/// mutated in place.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub file_path: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub embedding: EmbeddingData,
    pub kind: ChunkKind,
    pub last_modified_utc: u64,
}

/// Metadata kept in the built snapshot alongside the flat vector buffer.
#[derive(Debug, Clone)]
struct EntryMeta {
    file_path: PathBuf,
    start_line: u32,
    end_line: u32,
    content: String,
    kind: ChunkKind,
}

/// Flat per-precision vector storage.
#[derive(Debug)]
enum FlatVectors {
    Full(Vec<f32>),
    Half(Vec<f16>),
}

impl FlatVectors {
    fn byte_len(&self) -> usize {
        match self {
            Self::Full(v) => v.len() * 4,
            Self::Half(v) => v.len() * 2,
        }
    }
}

/// An immutable, fully built view of the index.
#[derive(Debug)]
struct Snapshot {
    dimension: usize,
    vectors: FlatVectors,
    /// Precomputed L2 norms, one per entry.
    norms: Vec<f32>,
    entries: Vec<EntryMeta>,
}

impl Snapshot {
    fn empty(dimension: usize, precision: VectorPrecision) -> Self {
        let vectors = match precision {
            VectorPrecision::Full => FlatVectors::Full(Vec::new()),
            VectorPrecision::Half => FlatVectors::Half(Vec::new()),
        };
        Self {
            dimension,
            vectors,
            norms: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Score a contiguous range of entries, keeping a local top-k.
    fn scan_range(&self, query: &[f32], query_norm: f32, range: Range<usize>, k: usize) -> Vec<Candidate> {
        let mut heap: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        let dim = self.dimension;
        // Scratch buffer for half-precision widening, reused across the range
        let mut scratch: Vec<f32> = Vec::new();

        for idx in range {
            let score = match &self.vectors {
                FlatVectors::Full(flat) => {
                    let vector = &flat[idx * dim..(idx + 1) * dim];
                    simd::cosine_with_norms(query, vector, query_norm, self.norms[idx])
                }
                FlatVectors::Half(flat) => {
                    scratch.clear();
                    scratch.extend(flat[idx * dim..(idx + 1) * dim].iter().map(|h| h.to_f32()));
                    simd::cosine_with_norms(query, &scratch, query_norm, self.norms[idx])
                }
            };

            heap.push(std::cmp::Reverse(Candidate { score, idx }));
            if heap.len() > k {
                heap.pop();
            }
        }

        // Best-first: Reverse sorts ascending, which is descending candidates
        heap.into_sorted_vec().into_iter().map(|r| r.0).collect()
    }
}

/// A scored entry index during the scan.
///
/// Ordering is by score descending with insertion order as the tie-break,
/// which keeps results deterministic for identical inputs across runs.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher score wins; on equal scores the earlier insertion wins
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Merge two best-first candidate lists into a bounded top-k list.
fn merge_top_k(a: Vec<Candidate>, b: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    let mut merged = Vec::with_capacity(k.min(a.len() + b.len()));
    let mut ia = a.into_iter().peekable();
    let mut ib = b.into_iter().peekable();

    while merged.len() < k {
        match (ia.peek(), ib.peek()) {
            (Some(ca), Some(cb)) => {
                if ca >= cb {
                    merged.push(ia.next().expect("peeked"));
                } else {
                    merged.push(ib.next().expect("peeked"));
                }
            }
            (Some(_), None) => merged.push(ia.next().expect("peeked")),
            (None, Some(_)) => merged.push(ib.next().expect("peeked")),
            (None, None) => break,
        }
    }
    merged
}

/// Brute-force nearest-neighbor index over a project's embeddings.
///
/// Effectively single-writer (one indexer mutates entries at a time, the
/// staging list is behind a mutex) and multi-reader (searches run against
/// the last built snapshot without blocking writers).
pub struct VectorIndex {
    dimension: VectorDimension,
    precision: VectorPrecision,
    /// Source of truth in insertion order; `build()` materializes it.
    staged: Mutex<Vec<VectorEntry>>,
    snapshot: RwLock<Arc<Snapshot>>,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .field("precision", &self.precision)
            .field("entry_count", &self.staged.lock().len())
            .finish()
    }
}

impl VectorIndex {
    /// Creates a new empty index.
    ///
    /// # Arguments
    /// * `dimension` - Fixed embedding dimension for the index's lifetime
    /// * `precision` - Encoding for stored vectors
    /// * `max_threads` - Upper bound on scan parallelism (0 means one per core)
    pub fn new(
        dimension: VectorDimension,
        precision: VectorPrecision,
        max_threads: usize,
    ) -> Result<Self, VectorError> {
        let threads = if max_threads == 0 {
            num_cpus::get()
        } else {
            max_threads.min(num_cpus::get())
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("semdex-scan-{i}"))
            .build()
            .map_err(|e| VectorError::ThreadPool(e.to_string()))?;

        Ok(Self {
            dimension,
            precision,
            staged: Mutex::new(Vec::new()),
            snapshot: RwLock::new(Arc::new(Snapshot::empty(dimension.get(), precision))),
            pool,
        })
    }

    /// Stage an entry for the next `build()`.
    ///
    /// Entries staged after a build are not searchable until the next
    /// build; the indexer always finishes a pass with one.
    pub fn add_entry(&self, entry: VectorEntry) -> Result<(), VectorError> {
        if entry.embedding.dimension() != self.dimension.get() {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension.get(),
                actual: entry.embedding.dimension(),
            });
        }
        let entry = if entry.embedding.precision() == self.precision {
            entry
        } else {
            // Stored precision is fixed per index; convert explicitly
            VectorEntry {
                embedding: entry.embedding.convert(self.precision),
                ..entry
            }
        };
        self.staged.lock().push(entry);
        Ok(())
    }

    /// Finalize the flat layout and atomically publish it for searches.
    pub fn build(&self) {
        let staged = self.staged.lock();
        let dim = self.dimension.get();
        let n = staged.len();

        let mut norms = Vec::with_capacity(n);
        let mut entries = Vec::with_capacity(n);
        let vectors = match self.precision {
            VectorPrecision::Full => {
                let mut flat = Vec::with_capacity(n * dim);
                for entry in staged.iter() {
                    let decoded = entry.embedding.decode();
                    norms.push(simd::norm(&decoded));
                    flat.extend_from_slice(&decoded);
                }
                FlatVectors::Full(flat)
            }
            VectorPrecision::Half => {
                let mut flat = Vec::with_capacity(n * dim);
                for entry in staged.iter() {
                    let decoded = entry.embedding.decode();
                    norms.push(simd::norm(&decoded));
                    flat.extend(decoded.iter().map(|v| f16::from_f32(*v)));
                }
                FlatVectors::Half(flat)
            }
        };

        for entry in staged.iter() {
            entries.push(EntryMeta {
                file_path: entry.file_path.clone(),
                start_line: entry.start_line,
                end_line: entry.end_line,
                content: entry.content.clone(),
                kind: entry.kind,
            });
        }

        let snapshot = Arc::new(Snapshot {
            dimension: dim,
            vectors,
            norms,
            entries,
        });
        *self.snapshot.write() = snapshot;
    }

    /// Remove all staged entries for a file.
    ///
    /// Returns the number removed. Takes effect for searches at the next
    /// `build()`.
    pub fn remove_entries_for_file(&self, path: &Path) -> usize {
        let mut staged = self.staged.lock();
        let before = staged.len();
        staged.retain(|e| e.file_path != path);
        before - staged.len()
    }

    /// Drop every entry and publish an empty snapshot.
    pub fn clear(&self) {
        self.staged.lock().clear();
        *self.snapshot.write() =
            Arc::new(Snapshot::empty(self.dimension.get(), self.precision));
    }

    /// Search the built snapshot for the `k` nearest entries.
    ///
    /// Results are ordered by descending cosine score with ties broken by
    /// insertion order. A query whose dimension does not match the index is
    /// a fatal error, never truncated or padded.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        self.dimension.validate_vector(query)?;

        let snapshot = Arc::clone(&self.snapshot.read());
        let n = snapshot.entries.len();
        if n == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = simd::norm(query);
        let partitions = (self.pool.current_num_threads() * PARTITIONS_PER_THREAD).max(1);
        let chunk = n.div_ceil(partitions);
        let ranges: Vec<Range<usize>> = (0..n)
            .step_by(chunk)
            .map(|start| start..(start + chunk).min(n))
            .collect();

        let top = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| snapshot.scan_range(query, query_norm, range, k))
                .reduce(Vec::new, |a, b| merge_top_k(a, b, k))
        });

        let mut results = Vec::with_capacity(top.len());
        for candidate in top {
            let meta = &snapshot.entries[candidate.idx];
            results.push(SearchResult {
                file_path: meta.file_path.clone(),
                start_line: meta.start_line,
                end_line: meta.end_line,
                content: meta.content.clone(),
                score: Score::from_cosine(candidate.score)?,
                chunk_kind: meta.kind,
            });
        }
        Ok(results)
    }

    /// Number of staged entries (live chunks).
    pub fn entry_count(&self) -> usize {
        self.staged.lock().len()
    }

    /// Number of distinct files with at least one entry.
    pub fn file_count(&self) -> usize {
        let staged = self.staged.lock();
        let mut files: Vec<&Path> = staged.iter().map(|e| e.file_path.as_path()).collect();
        files.sort_unstable();
        files.dedup();
        files.len()
    }

    /// Rough memory footprint of the built snapshot plus metadata.
    pub fn memory_usage_bytes(&self) -> usize {
        let snapshot = self.snapshot.read();
        let meta: usize = snapshot
            .entries
            .iter()
            .map(|e| e.content.len() + std::mem::size_of::<EntryMeta>())
            .sum();
        snapshot.vectors.byte_len() + snapshot.norms.len() * 4 + meta
    }

    /// The fixed embedding dimension for this index.
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// The stored vector precision.
    pub fn precision(&self) -> VectorPrecision {
        self.precision
    }
}
