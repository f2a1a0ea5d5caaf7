/// The main library module for semdex
pub mod cache;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use cache::{CacheStats, ContentHash, EmbeddingCache, EmbeddingKind};
pub use chunking::{ChunkExtractor, SpanChunker};
pub use config::Settings;
pub use embedding::{CachedEmbedder, EmbeddingProvider, ProviderError, RetryPolicy};
pub use error::{IndexError, IndexResult};
pub use indexing::{
    ChangeMonitor, ChangeSummary, FileRecord, IncrementalIndexer, IndexStats, IndexerRegistry,
    ProgressEvent, ProgressSender, ProjectHandle,
};
pub use types::{Chunk, ChunkKind, SearchResult};
pub use vector::{Score, VectorDimension, VectorEntry, VectorIndex, VectorPrecision};
