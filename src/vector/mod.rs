//! Vector search functionality for the semantic index.
//!
//! This module provides the in-memory vector index and its SIMD scoring
//! kernels. The design is a brute-force exhaustive scan over flat,
//! contiguous per-precision buffers, parallelized across a bounded worker
//! pool with per-worker top-K reduction.

mod index;
mod simd;
mod types;

// Re-export core types for public API
pub use index::{VectorEntry, VectorIndex};
pub use simd::{cosine_similarity, dot, norm};
pub use types::{
    EmbeddingData, Score, VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorPrecision,
};
