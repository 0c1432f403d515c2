//! Native change notifications for one source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use foldex_core::{ExclusionPolicy, SourceId, WatchError, WatchEvent};

use crate::debounce::{self, Debouncer};
use crate::normalize::{RawKind, normalize, watched_path};

/// Subscription state held while a watcher is active.
struct ActiveWatch {
    // Dropping the notify handle releases the OS subscription.
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
}

/// Watches one source root and emits debounced [`WatchEvent`]s.
pub struct ChangeWatcher {
    source_id: SourceId,
    root: PathBuf,
    policy: ExclusionPolicy,
    window: Duration,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    active: Option<ActiveWatch>,
}

impl ChangeWatcher {
    pub fn new(
        source_id: SourceId,
        root: impl Into<PathBuf>,
        policy: ExclusionPolicy,
        window: Duration,
        events_tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        Self {
            source_id,
            root: root.into(),
            policy,
            window,
            events_tx,
            active: None,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Subscribe to changes below the root.
    ///
    /// Returns whether the watcher is active afterwards. Failures are logged
    /// and leave the watcher inactive. Must be called from within a Tokio
    /// runtime, which drives the debounce timers.
    pub fn start(&mut self) -> bool {
        if self.active.is_some() {
            return true;
        }
        match self.subscribe() {
            Ok(active) => {
                tracing::info!(source = %self.source_id, root = %self.root.display(), "watching source");
                self.active = Some(active);
                true
            }
            Err(err) => {
                tracing::warn!(source = %self.source_id, error = %err, "watcher not started");
                false
            }
        }
    }

    /// Cancel pending timers and release the subscription.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            tracing::info!(source = %self.source_id, "stopped watching source");
        }
    }

    fn subscribe(&self) -> Result<ActiveWatch, WatchError> {
        if !self.root.is_dir() {
            return Err(WatchError::NotADirectory {
                path: self.root.clone(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let root = self.root.clone();
        let canonical_root = self.root.canonicalize().unwrap_or_else(|_| root.clone());
        let policy = self.policy.clone();
        let subscribe_err = |e: notify::Error| WatchError::Subscribe {
            path: self.root.clone(),
            message: e.to_string(),
        };

        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(raw) = RawKind::from_event_kind(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    let Some(path) = watched_path(&policy, &root, &canonical_root, &path) else {
                        continue;
                    };
                    let kind = normalize(raw, &path);
                    // Receiver gone means the watcher is shutting down.
                    let _ = raw_tx.send((path, kind));
                }
            }
            Err(err) => tracing::warn!(error = %err, "file watcher error"),
        })
        .map_err(subscribe_err)?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(subscribe_err)?;

        let cancel = CancellationToken::new();
        runtime.spawn(debounce::run(
            self.source_id,
            Debouncer::new(self.window),
            raw_rx,
            self.events_tx.clone(),
            cancel.clone(),
        ));

        Ok(ActiveWatch {
            _watcher: watcher,
            cancel,
        })
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("source_id", &self.source_id)
            .field("root", &self.root)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldex_core::ChangeKind;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn watcher(root: &Path) -> (ChangeWatcher, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = ChangeWatcher::new(
            SourceId::new(1),
            root,
            ExclusionPolicy::default(),
            Duration::from_millis(50),
            tx,
        );
        (watcher, rx)
    }

    #[tokio::test]
    async fn test_start_on_missing_dir_stays_inactive() {
        let temp = TempDir::new().unwrap();
        let (mut watcher, _rx) = watcher(&temp.path().join("missing"));
        assert!(!watcher.start());
        assert!(!watcher.is_active());
        // Stopping an inactive watcher is a no-op.
        watcher.stop();
        watcher.stop();
    }

    #[test]
    fn test_start_without_runtime_stays_inactive() {
        let temp = TempDir::new().unwrap();
        let (mut watcher, _rx) = watcher(temp.path());
        assert!(!watcher.start());
    }

    #[tokio::test]
    async fn test_new_file_reported_and_excluded_ignored() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("project/.git")).unwrap();
        let (mut watcher, mut rx) = watcher(temp.path());
        assert!(watcher.start());
        assert!(watcher.start());

        fs::write(temp.path().join("project/.git/config"), "[core]").unwrap();
        fs::write(temp.path().join(".hidden"), "x").unwrap();
        let file = temp.path().join("new.txt");
        fs::write(&file, "hello").unwrap();

        let event = timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.path.ends_with("new.txt") {
                    break event;
                }
                assert!(!event.path.to_string_lossy().contains(".git"));
                assert!(!event.path.ends_with(".hidden"));
            }
        })
        .await
        .unwrap();
        assert!(matches!(event.kind, ChangeKind::Add | ChangeKind::Change));

        watcher.stop();
        assert!(!watcher.is_active());
    }
}
