//! Registry of active watchers and the single event applier.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use foldex_core::{
    ChangeKind, ExclusionPolicy, FileRecord, IndexConfig, IndexStore, SourceId, StoreResult,
    WatchError, WatchEvent, resolve_owner,
};

use crate::watcher::ChangeWatcher;

/// A change that has been applied to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub path: PathBuf,
    /// Source holding the affected record.
    pub source_id: SourceId,
}

/// Owns one [`ChangeWatcher`] per source and applies their events.
///
/// Events from every watcher go through one channel into a single applier
/// task, so changes to the same path are applied in order.
pub struct WatcherManager<S> {
    store: Arc<S>,
    policy: ExclusionPolicy,
    config: IndexConfig,
    watchers: Mutex<HashMap<SourceId, ChangeWatcher>>,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    notify_tx: broadcast::Sender<ChangeNotification>,
    shutdown: CancellationToken,
    applier: Mutex<Option<JoinHandle<()>>>,
}

impl<S: IndexStore + 'static> WatcherManager<S> {
    /// Create a manager and start its applier task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<S>, config: IndexConfig) -> Result<Self, WatchError> {
        config.validate()?;
        let policy = config.exclusion_policy()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, _) = broadcast::channel(1024);
        let shutdown = CancellationToken::new();
        let applier = runtime.spawn(run_applier(
            Arc::clone(&store),
            events_rx,
            notify_tx.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            store,
            policy,
            config,
            watchers: Mutex::new(HashMap::new()),
            events_tx,
            notify_tx,
            shutdown,
            applier: Mutex::new(Some(applier)),
        })
    }
}

impl<S: IndexStore> WatcherManager<S> {
    /// Subscribe to applied changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notify_tx.subscribe()
    }

    /// Start (or restart) watching a registered source.
    ///
    /// Returns whether a watcher is active for the source afterwards.
    pub fn start_watching(&self, source_id: SourceId) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let source = match self.store.get_source_by_id(source_id) {
            Ok(Some(source)) => source,
            Ok(None) => {
                tracing::warn!(source = %source_id, "cannot watch unknown source");
                return false;
            }
            Err(err) => {
                tracing::warn!(source = %source_id, error = %err, "cannot load source");
                return false;
            }
        };

        let mut watchers = self.watchers();
        if let Some(mut previous) = watchers.remove(&source_id) {
            previous.stop();
        }

        let mut watcher = ChangeWatcher::new(
            source_id,
            source.path,
            self.policy.clone(),
            self.config.debounce_window(),
            self.events_tx.clone(),
        );
        if !watcher.start() {
            return false;
        }
        watchers.insert(source_id, watcher);
        true
    }

    /// Stop watching a source. No-op if it is not watched.
    pub fn stop_watching(&self, source_id: SourceId) {
        if let Some(mut watcher) = self.watchers().remove(&source_id) {
            watcher.stop();
        }
    }

    pub fn is_watching(&self, source_id: SourceId) -> bool {
        self.watchers().contains_key(&source_id)
    }

    /// Sources with an active watcher.
    pub fn watched_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = self.watchers().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Stop every watcher and the applier.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.watchers().drain().collect();
        for (_, mut watcher) in drained {
            watcher.stop();
        }
        self.shutdown.cancel();
        let applier = self
            .applier
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(applier) = applier {
            applier.abort();
        }
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<SourceId, ChangeWatcher>> {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S> Drop for WatcherManager<S> {
    fn drop(&mut self) {
        let watchers = self
            .watchers
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, mut watcher) in watchers.drain() {
            watcher.stop();
        }
        self.shutdown.cancel();
    }
}

async fn run_applier<S: IndexStore>(
    store: Arc<S>,
    mut events_rx: mpsc::UnboundedReceiver<WatchEvent>,
    notify_tx: broadcast::Sender<ChangeNotification>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match apply_event(store.as_ref(), event) {
            Ok(Some(notification)) => {
                // No subscribers is fine.
                let _ = notify_tx.send(notification);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "failed to apply change"),
        }
    }
    tracing::debug!("change applier stopped");
}

/// Apply one settled change to the index.
///
/// Returns `None` when the source has been removed since the change was
/// observed.
pub(crate) fn apply_event<S: IndexStore + ?Sized>(
    store: &S,
    event: WatchEvent,
) -> StoreResult<Option<ChangeNotification>> {
    let Some(source) = store.get_source_by_id(event.source_id)? else {
        tracing::debug!(source = %event.source_id, "dropping change for removed source");
        return Ok(None);
    };
    let owner = resolve_owner(store, source)?;
    let event = WatchEvent {
        source_id: owner.id,
        ..event
    };
    if let Err(err) = store.insert_event(&event) {
        tracing::warn!(path = %event.path.display(), error = %err, "failed to record change");
    }

    match event.kind {
        ChangeKind::Add | ChangeKind::Change => match std::fs::metadata(&event.path) {
            Ok(metadata) if metadata.is_file() => {
                let record =
                    FileRecord::from_metadata(owner.id, &owner.path, &event.path, &metadata, Utc::now());
                store.upsert_file(&record)?;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(path = %event.path.display(), error = %err, "changed path vanished");
            }
        },
        ChangeKind::Unlink => {
            let record = match store.get_file_by_path(owner.id, &event.path)? {
                Some(record) => Some(record),
                None => store.find_file_by_path(&event.path)?,
            };
            if let Some(record) = record {
                store.mark_file_missing(record.source_id, &record.id)?;
            }
        }
    }
    tracing::debug!(source = %owner.id, path = %event.path.display(), kind = %event.kind, "applied change");

    Ok(Some(ChangeNotification {
        kind: event.kind,
        path: event.path,
        source_id: owner.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldex_core::{
        FileId, FileStatus, FolderId, FolderRecord, MemoryStore, Source, StoreError,
    };
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Store whose audit log always fails.
    struct NoAuditStore(MemoryStore);

    impl IndexStore for NoAuditStore {
        fn add_source(&self, name: &str, path: &Path) -> StoreResult<Source> {
            self.0.add_source(name, path)
        }
        fn list_sources(&self) -> StoreResult<Vec<Source>> {
            self.0.list_sources()
        }
        fn get_source_by_id(&self, id: SourceId) -> StoreResult<Option<Source>> {
            self.0.get_source_by_id(id)
        }
        fn get_parent_sources(&self, path: &Path) -> StoreResult<Vec<Source>> {
            self.0.get_parent_sources(path)
        }
        fn link_source_to_parent(&self, id: SourceId, parent: SourceId) -> StoreResult<()> {
            self.0.link_source_to_parent(id, parent)
        }
        fn upsert_file_batch(&self, files: &[FileRecord]) -> StoreResult<()> {
            self.0.upsert_file_batch(files)
        }
        fn upsert_folder_batch(&self, folders: &[FolderRecord]) -> StoreResult<()> {
            self.0.upsert_folder_batch(folders)
        }
        fn delete_files_not_in_set(
            &self,
            source: SourceId,
            keep: &HashSet<FileId>,
        ) -> StoreResult<usize> {
            self.0.delete_files_not_in_set(source, keep)
        }
        fn delete_folders_not_in_set(
            &self,
            source: SourceId,
            keep: &HashSet<FolderId>,
        ) -> StoreResult<usize> {
            self.0.delete_folders_not_in_set(source, keep)
        }
        fn get_file(&self, source: SourceId, id: &FileId) -> StoreResult<Option<FileRecord>> {
            self.0.get_file(source, id)
        }
        fn get_file_by_path(&self, source: SourceId, path: &Path) -> StoreResult<Option<FileRecord>> {
            self.0.get_file_by_path(source, path)
        }
        fn find_file_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
            self.0.find_file_by_path(path)
        }
        fn mark_file_missing(&self, source: SourceId, id: &FileId) -> StoreResult<bool> {
            self.0.mark_file_missing(source, id)
        }
        fn get_file_count(&self, source: SourceId) -> StoreResult<u64> {
            self.0.get_file_count(source)
        }
        fn get_files(&self, source: SourceId) -> StoreResult<Vec<FileRecord>> {
            self.0.get_files(source)
        }
        fn get_folders(&self, source: SourceId) -> StoreResult<Vec<FolderRecord>> {
            self.0.get_folders(source)
        }
        fn insert_event(&self, _event: &WatchEvent) -> StoreResult<()> {
            Err(StoreError::backend("audit log unavailable"))
        }
        fn events_for_source(&self, source: SourceId) -> StoreResult<Vec<WatchEvent>> {
            self.0.events_for_source(source)
        }
        fn save_sync(&self) -> StoreResult<()> {
            self.0.save_sync()
        }
    }

    #[test]
    fn test_add_then_unlink() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let source = store.add_source("root", temp.path()).unwrap();
        let path = temp.path().join("new.txt");
        fs::write(&path, "hello").unwrap();

        let applied = apply_event(&store, WatchEvent::now(ChangeKind::Add, &path, source.id))
            .unwrap()
            .unwrap();
        assert_eq!(applied.kind, ChangeKind::Add);
        let record = store.get_file_by_path(source.id, &path).unwrap().unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.relative_path, "new.txt");

        fs::remove_file(&path).unwrap();
        apply_event(&store, WatchEvent::now(ChangeKind::Unlink, &path, source.id)).unwrap();
        let record = store.get_file_by_path(source.id, &path).unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Missing);

        let kinds: Vec<_> = store
            .events_for_source(source.id)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Unlink]);
    }

    #[test]
    fn test_directories_are_not_file_records() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let source = store.add_source("root", temp.path()).unwrap();
        let dir = temp.path().join("folder");
        fs::create_dir(&dir).unwrap();

        apply_event(&store, WatchEvent::now(ChangeKind::Add, &dir, source.id)).unwrap();
        assert_eq!(store.get_file_count(source.id).unwrap(), 0);
        assert_eq!(store.events_for_source(source.id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_source_dropped_silently() {
        let store = MemoryStore::new();
        let applied = apply_event(
            &store,
            WatchEvent::now(ChangeKind::Add, "/nowhere/a.txt", SourceId::new(42)),
        )
        .unwrap();
        assert!(applied.is_none());
    }

    #[test]
    fn test_linked_source_changes_land_on_owner() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let parent = store.add_source("root", temp.path()).unwrap();
        let child = store.add_source("sub", &temp.path().join("sub")).unwrap();
        store.link_source_to_parent(child.id, parent.id).unwrap();

        let path = temp.path().join("sub/a.txt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();

        let applied = apply_event(&store, WatchEvent::now(ChangeKind::Add, &path, child.id))
            .unwrap()
            .unwrap();
        assert_eq!(applied.source_id, parent.id);
        assert_eq!(store.get_file_count(child.id).unwrap(), 0);
        let record = store.get_file_by_path(parent.id, &path).unwrap().unwrap();
        assert_eq!(record.relative_path, "sub/a.txt");
    }

    #[test]
    fn test_unlink_falls_back_to_any_source() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let a = store.add_source("a", &temp.path().join("a")).unwrap();
        let b = store.add_source("b", &temp.path().join("b")).unwrap();
        let path = temp.path().join("a/file.txt");
        let record = FileRecord::new(a.id, &temp.path().join("a"), &path, 1, 1, Utc::now());
        store.upsert_file(&record).unwrap();

        apply_event(&store, WatchEvent::now(ChangeKind::Unlink, &path, b.id)).unwrap();
        let record = store.get_file(a.id, &record.id).unwrap().unwrap();
        assert!(!record.is_present());
        assert!(record.path.ends_with("a/file.txt"));
    }

    #[test]
    fn test_audit_failure_still_applies_change() {
        let temp = TempDir::new().unwrap();
        let store = NoAuditStore(MemoryStore::new());
        let source = store.add_source("root", temp.path()).unwrap();
        let path = temp.path().join("kept.txt");
        fs::write(&path, "data").unwrap();

        let applied = apply_event(&store, WatchEvent::now(ChangeKind::Add, &path, source.id))
            .unwrap()
            .unwrap();
        assert_eq!(applied.kind, ChangeKind::Add);
        assert!(store.get_file_by_path(source.id, &path).unwrap().is_some());

        fs::remove_file(&path).unwrap();
        apply_event(&store, WatchEvent::now(ChangeKind::Unlink, &path, source.id)).unwrap();
        let record = store.get_file_by_path(source.id, &path).unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Missing);
    }
}
