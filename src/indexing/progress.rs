//! Progress reporting for indexing runs.
//!
//! Events flow over an unbounded channel so the indexer never blocks on a
//! slow consumer. Every run ends with exactly one terminal event,
//! `Completed` or `Failed`, even when the run errors out early.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::time::Duration;

/// Coarse phases of an indexing run, with counters where they apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Walking the tree and hashing files.
    Scanning { discovered: usize },
    /// Embedding chunk batches.
    Embedding { current: usize, total: usize },
    /// Rebuilding the searchable snapshot.
    Committing,
    /// Terminal: the run finished (possibly with per-file skips).
    Completed,
    /// Terminal: the run aborted with a fatal error.
    Failed { message: String },
}

impl ProgressEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Sending half of a progress stream. A disconnected or absent receiver
/// is not an error; events are simply dropped.
#[derive(Debug, Clone)]
pub struct ProgressSender(Option<Sender<ProgressEvent>>);

impl ProgressSender {
    /// A sender that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self(None)
    }

    /// Create a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (Self(Some(tx)), rx)
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}

/// Totals reported at the end of one indexing run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexStats {
    /// Files whose chunks were (re)embedded and committed.
    pub files_processed: usize,
    /// Chunks added to the index this run.
    pub chunks_created: usize,
    /// Files skipped after read or embedding failures.
    pub files_skipped: usize,
    /// Chunks dropped along with skipped files.
    pub chunks_skipped: usize,
    /// Wall time of the whole run.
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub changes: ChangeSummary,
}

/// Per-category change detection outcome for one run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChangeSummary {
    pub added: Vec<std::path::PathBuf>,
    pub modified: Vec<std::path::PathBuf>,
    pub removed: Vec<std::path::PathBuf>,
    pub unchanged: usize,
}

impl ChangeSummary {
    /// Whether this run had any index-affecting change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sender_does_not_panic() {
        let sender = ProgressSender::disabled();
        sender.send(ProgressEvent::Completed);
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (tx, rx) = ProgressSender::channel();
        tx.send(ProgressEvent::Scanning { discovered: 3 });
        tx.send(ProgressEvent::Completed);

        assert_eq!(rx.recv().unwrap(), ProgressEvent::Scanning { discovered: 3 });
        let last = rx.recv().unwrap();
        assert!(last.is_terminal());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (tx, rx) = ProgressSender::channel();
        drop(rx);
        tx.send(ProgressEvent::Committing);
    }

    #[test]
    fn test_change_summary_empty() {
        let mut summary = ChangeSummary::default();
        summary.unchanged = 10;
        assert!(summary.is_empty());

        summary.added.push("a.rs".into());
        assert!(!summary.is_empty());
    }
}
