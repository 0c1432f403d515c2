//! Per-path quiet-window debouncing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};

use foldex_core::{ChangeKind, SourceId, WatchEvent};

use crate::normalize::settle;

/// Collapses bursts of changes to the same path into one.
///
/// Every push for a path restarts its timer and replaces its pending kind.
/// A path is released once it has been quiet for the whole window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    queue: DelayQueue<PathBuf>,
    pending: HashMap<PathBuf, (delay_queue::Key, ChangeKind)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            queue: DelayQueue::new(),
            pending: HashMap::new(),
        }
    }

    /// Record a change, restarting the path's quiet window.
    pub fn push(&mut self, path: PathBuf, kind: ChangeKind) {
        if let Some((key, pending)) = self.pending.get_mut(&path) {
            self.queue.reset(key, self.window);
            *pending = kind;
            return;
        }
        let key = self.queue.insert(path.clone(), self.window);
        self.pending.insert(path, (key, kind));
    }

    /// Number of paths waiting for their window to pass.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for the next path to go quiet.
    ///
    /// The kind is re-checked against the filesystem before it is returned.
    /// Resolves to `None` immediately when nothing is pending.
    pub async fn next_settled(&mut self) -> Option<(PathBuf, ChangeKind)> {
        let expired = self.queue.next().await?;
        let path = expired.into_inner();
        let (_, kind) = self.pending.remove(&path)?;
        let kind = settle(kind, &path);
        Some((path, kind))
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

/// Feed raw changes through a debouncer until cancelled.
pub(crate) async fn run(
    source_id: SourceId,
    mut debouncer: Debouncer,
    mut raw_rx: mpsc::UnboundedReceiver<(PathBuf, ChangeKind)>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            raw = raw_rx.recv() => match raw {
                Some((path, kind)) => debouncer.push(path, kind),
                None => break,
            },
            Some((path, kind)) = debouncer.next_settled(), if !debouncer.is_empty() => {
                tracing::debug!(source = %source_id, path = %path.display(), %kind, "change settled");
                if events_tx.send(WatchEvent::now(kind, path, source_id)).is_err() {
                    break;
                }
            }
        }
    }
    debouncer.clear();
}
