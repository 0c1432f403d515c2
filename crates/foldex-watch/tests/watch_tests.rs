use std::fs;
use std::sync::Arc;
use std::time::Duration;

use foldex_core::{ChangeKind, IndexConfig, IndexStore, MemoryStore, SourceId};
use foldex_watch::{ChangeNotification, WatcherManager};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn config() -> IndexConfig {
    IndexConfig::builder().debounce_ms(50u64).build().unwrap()
}

async fn next_for(
    rx: &mut broadcast::Receiver<ChangeNotification>,
    name: &str,
    kinds: &[ChangeKind],
) -> ChangeNotification {
    timeout(Duration::from_secs(5), async {
        loop {
            let change = rx.recv().await.unwrap();
            if change.path.ends_with(name) && kinds.contains(&change.kind) {
                break change;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_manager_applies_live_changes() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("root", temp.path()).unwrap();

    let manager = WatcherManager::new(Arc::clone(&store), config()).unwrap();
    let mut rx = manager.subscribe();
    assert!(manager.start_watching(source.id));

    let path = temp.path().join("live.txt");
    fs::write(&path, "hello").unwrap();
    // Creation followed by a write settles as whichever came last.
    next_for(&mut rx, "live.txt", &[ChangeKind::Add, ChangeKind::Change]).await;
    let record = store.get_file_by_path(source.id, &path).unwrap().unwrap();
    assert!(record.is_present());
    assert_eq!(record.size, 5);

    fs::remove_file(&path).unwrap();
    next_for(&mut rx, "live.txt", &[ChangeKind::Unlink]).await;
    let record = store.get_file_by_path(source.id, &path).unwrap().unwrap();
    assert!(!record.is_present());

    manager.stop_all();
    assert!(!manager.is_watching(source.id));
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("root", temp.path()).unwrap();
    let manager = WatcherManager::new(Arc::clone(&store), config()).unwrap();

    assert!(manager.start_watching(source.id));
    assert!(manager.start_watching(source.id));
    assert_eq!(manager.watched_sources(), vec![source.id]);

    manager.stop_watching(source.id);
    manager.stop_watching(source.id);
    assert!(manager.watched_sources().is_empty());
}

#[tokio::test]
async fn test_unwatchable_sources_do_not_affect_others() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let good = store.add_source("good", temp.path()).unwrap();
    let missing = store
        .add_source("missing", &temp.path().join("missing"))
        .unwrap();
    let manager = WatcherManager::new(Arc::clone(&store), config()).unwrap();

    assert!(!manager.start_watching(missing.id));
    assert!(!manager.start_watching(SourceId::new(99)));
    assert!(manager.start_watching(good.id));
    assert_eq!(manager.watched_sources(), vec![good.id]);
}

#[test]
fn test_manager_needs_runtime() {
    let store = Arc::new(MemoryStore::new());
    assert!(WatcherManager::new(store, IndexConfig::default()).is_err());
}
