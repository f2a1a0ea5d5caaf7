//! Incremental indexing pipeline: discovery, change detection, chunking,
//! embedding, and change monitoring.

mod file_info;
mod indexer;
mod monitor;
mod progress;
mod registry;
mod walker;

pub use file_info::{FileRecord, utc_now};
pub use indexer::IncrementalIndexer;
pub use monitor::{
    ChangeMonitor, ChangeSignal, ChangeSourceGuard, ReindexTarget, spawn_change_source,
};
pub use progress::{ChangeSummary, IndexStats, ProgressEvent, ProgressSender};
pub use registry::{IndexerRegistry, ProjectHandle, ProjectStats};
pub use walker::FileWalker;
