//! Debounced filesystem monitoring that drives incremental reindexing.
//!
//! The monitor is a small state machine: idle until a change signal
//! arrives, then holding a debounce deadline that every further signal
//! pushes back, then running one blocking reindex pass. Signals that
//! arrive while a pass is running stay queued in the channel and coalesce
//! into the next cycle, so concurrent bursts cost at most one extra pass.

use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::Settings;
use crate::config::{DATA_DIR, WatchMode};
use crate::error::IndexResult;

use super::progress::IndexStats;

/// One filesystem change notification. The monitor coalesces these, so
/// the path is informational only.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    pub path: Option<PathBuf>,
}

/// What the monitor reindexes. Abstracted so the debounce logic is
/// testable without a real project.
pub trait ReindexTarget: Send + Sync {
    fn reindex(&self) -> IndexResult<IndexStats>;
}

/// Debounced reindex driver over a stream of change signals.
pub struct ChangeMonitor {
    debounce: Duration,
    rx: mpsc::Receiver<ChangeSignal>,
    target: Arc<dyn ReindexTarget>,
}

impl ChangeMonitor {
    pub fn new(
        debounce: Duration,
        rx: mpsc::Receiver<ChangeSignal>,
        target: Arc<dyn ReindexTarget>,
    ) -> Self {
        Self {
            debounce,
            rx,
            target,
        }
    }

    /// Run until every sender is dropped.
    ///
    /// Starts with one verification pass so changes made while the
    /// monitor was down are picked up without waiting for a new signal.
    pub async fn run(mut self) {
        info!("startup verification pass");
        self.reindex_once().await;

        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                signal = self.rx.recv() => match signal {
                    Some(signal) => {
                        debug!("change signal: {:?}", signal.path);
                        // Every signal pushes the quiet period back out
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => {
                        debug!("all change sources closed, monitor stopping");
                        break;
                    }
                },
                () = sleep_until_opt(deadline), if deadline.is_some() => {
                    deadline = None;
                    self.reindex_once().await;
                }
            }
        }
    }

    async fn reindex_once(&self) {
        let target = Arc::clone(&self.target);
        match tokio::task::spawn_blocking(move || target.reindex()).await {
            Ok(Ok(stats)) => {
                if stats.changes.is_empty() {
                    debug!("reindex pass found no changes");
                } else {
                    info!(
                        "reindex pass: {} processed, {} removed, {} skipped",
                        stats.files_processed,
                        stats.changes.removed.len(),
                        stats.files_skipped,
                    );
                }
            }
            Ok(Err(e)) => error!("reindex pass failed: {e}"),
            Err(e) => error!("reindex task panicked: {e}"),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        // Guarded out by the `if deadline.is_some()` precondition
        None => std::future::pending().await,
    }
}

/// Spawn the change source selected by configuration and return the
/// signal receiver plus a guard keeping the source alive.
pub fn spawn_change_source(
    settings: &Settings,
    root: &Path,
) -> IndexResult<(mpsc::Receiver<ChangeSignal>, ChangeSourceGuard)> {
    let (tx, rx) = mpsc::channel(256);
    let guard = match settings.watch.mode {
        WatchMode::Native => ChangeSourceGuard::Native(native_source(root, tx)?),
        WatchMode::Polling => {
            let interval = Duration::from_secs(settings.watch.poll_interval_secs);
            ChangeSourceGuard::Polling(polling_source(root.to_path_buf(), interval, tx))
        }
    };
    Ok((rx, guard))
}

/// Keeps the active change source alive; dropping it stops the stream.
pub enum ChangeSourceGuard {
    Native(notify::RecommendedWatcher),
    Polling(tokio::task::JoinHandle<()>),
}

impl Drop for ChangeSourceGuard {
    fn drop(&mut self) {
        if let Self::Polling(handle) = self {
            handle.abort();
        }
    }
}

/// OS-native change notifications bridged onto the async channel.
fn native_source(
    root: &Path,
    tx: mpsc::Sender<ChangeSignal>,
) -> IndexResult<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        match res {
            Ok(event) => {
                if !is_relevant(&event) {
                    return;
                }
                let path = event.paths.first().cloned();
                // The callback is sync; a full channel just drops the
                // signal, which is safe because signals coalesce anyway
                let _ = tx.try_send(ChangeSignal { path });
            }
            Err(e) => warn!("watch error: {e}"),
        }
    })
    .map_err(|e| crate::error::IndexError::General(format!("failed to create file watcher: {e}")))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| {
            crate::error::IndexError::General(format!(
                "cannot watch {}: {e}",
                root.display()
            ))
        })?;
    Ok(watcher)
}

fn is_relevant(event: &Event) -> bool {
    let kind_relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    // Writes under the data dir must not retrigger indexing
    kind_relevant
        && !event
            .paths
            .iter()
            .all(|p| p.components().any(|c| c.as_os_str() == DATA_DIR))
}

/// Periodic re-scan fallback for filesystems without reliable native
/// notifications. Sends one signal per interval tick; the indexer's own
/// hash diff decides whether anything actually changed.
fn polling_source(
    root: PathBuf,
    interval: Duration,
    tx: mpsc::Sender<ChangeSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup verification
        // is not doubled
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx
                .send(ChangeSignal {
                    path: Some(root.clone()),
                })
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget {
        passes: AtomicUsize,
        delay: Duration,
    }

    impl CountingTarget {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                passes: AtomicUsize::new(0),
                delay,
            })
        }
    }

    impl ReindexTarget for CountingTarget {
        fn reindex(&self) -> IndexResult<IndexStats> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(IndexStats::default())
        }
    }

    fn signal() -> ChangeSignal {
        ChangeSignal { path: None }
    }

    #[tokio::test]
    async fn test_startup_pass_runs_without_signals() {
        let target = CountingTarget::new(Duration::ZERO);
        let (tx, rx) = mpsc::channel(8);
        let monitor = ChangeMonitor::new(Duration::from_millis(10), rx, Arc::clone(&target) as _);

        drop(tx);
        monitor.run().await;

        assert_eq!(target.passes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_burst_of_signals_coalesces_into_one_pass() {
        let target = CountingTarget::new(Duration::ZERO);
        let (tx, rx) = mpsc::channel(64);
        let monitor = ChangeMonitor::new(Duration::from_millis(30), rx, Arc::clone(&target) as _);
        let handle = tokio::spawn(monitor.run());

        for _ in 0..20 {
            tx.send(signal()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        drop(tx);
        handle.await.unwrap();

        // Startup pass plus exactly one debounced pass
        assert_eq!(target.passes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_each_signal_extends_the_quiet_period() {
        let target = CountingTarget::new(Duration::ZERO);
        let (tx, rx) = mpsc::channel(8);
        let monitor = ChangeMonitor::new(Duration::from_millis(50), rx, Arc::clone(&target) as _);
        let handle = tokio::spawn(monitor.run());

        // Keep poking more often than the debounce window
        for _ in 0..4 {
            tx.send(signal()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // No debounced pass can have fired yet
        assert_eq!(target.passes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        drop(tx);
        handle.await.unwrap();
        assert_eq!(target.passes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_signals_during_reindex_queue_for_next_cycle() {
        let target = CountingTarget::new(Duration::from_millis(60));
        let (tx, rx) = mpsc::channel(8);
        let monitor = ChangeMonitor::new(Duration::from_millis(10), rx, Arc::clone(&target) as _);
        let handle = tokio::spawn(monitor.run());

        // These arrive while the (slow) startup pass is still running
        tx.send(signal()).await.unwrap();
        tx.send(signal()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(tx);
        handle.await.unwrap();

        // Startup pass, then one pass for the queued signals
        assert_eq!(target.passes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_data_dir_events_are_filtered() {
        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/proj/.semdex/files.json"));
        assert!(!is_relevant(&event));

        let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/proj/src/lib.rs"));
        assert!(is_relevant(&event));
    }
}
