use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use foldex_core::{
    ChangeKind, FileId, FileRecord, IndexStore, MemoryStore, Placement, PlacementStore, SourceId,
    StoreError, WatchEvent, compute_file_id, resolve_owner, virtual_file_count,
};
use tempfile::TempDir;

fn file(source: SourceId, root: &str, path: &str, size: u64) -> FileRecord {
    FileRecord::new(source, Path::new(root), Path::new(path), size, 1_000, Utc::now())
}

#[test]
fn test_identity_is_pure() {
    let path = Path::new("/data/report.pdf");
    let ids: HashSet<FileId> = (0..10).map(|_| compute_file_id(path, 4096, 99)).collect();
    assert_eq!(ids.len(), 1);
}

#[test]
fn test_snapshot_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let state = temp.path().join("state.json");

    let source_id = {
        let store = MemoryStore::open(&state).unwrap();
        let source = store.add_source("data", Path::new("/data")).unwrap();
        store
            .upsert_file(&file(source.id, "/data", "/data/a.txt", 100))
            .unwrap();
        store
            .insert_event(&WatchEvent::now(ChangeKind::Add, "/data/a.txt", source.id))
            .unwrap();
        store
            .put_placements(
                source.id,
                vec![Placement::new(FileId::from("x"), "/Docs/a.txt")],
            )
            .unwrap();
        store.save_sync().unwrap();
        source.id
    };

    let reopened = MemoryStore::open(&state).unwrap();
    assert_eq!(reopened.list_sources().unwrap().len(), 1);
    assert_eq!(reopened.get_file_count(source_id).unwrap(), 1);
    assert!(
        reopened
            .get_file_by_path(source_id, Path::new("/data/a.txt"))
            .unwrap()
            .is_some()
    );
    assert_eq!(reopened.events_for_source(source_id).unwrap().len(), 1);
    assert_eq!(reopened.placements_for_source(source_id).unwrap().len(), 1);

    // New sources continue the id sequence.
    let next = reopened.add_source("other", Path::new("/other")).unwrap();
    assert!(next.id > source_id);
}

#[test]
fn test_save_without_snapshot_is_noop() {
    let store = MemoryStore::new();
    assert!(store.snapshot_path().is_none());
    store.save_sync().unwrap();
}

#[test]
fn test_linked_source_counts_owner_files() {
    let store = MemoryStore::new();
    let parent = store.add_source("data", Path::new("/data")).unwrap();
    let child = store.add_source("sub", Path::new("/data/sub")).unwrap();

    let records = vec![
        file(parent.id, "/data", "/data/top.txt", 1),
        file(parent.id, "/data", "/data/sub/one.txt", 1),
        file(parent.id, "/data", "/data/sub/deep/two.txt", 1),
    ];
    store.upsert_file_batch(&records).unwrap();
    store.link_source_to_parent(child.id, parent.id).unwrap();

    let child = store.get_source_by_id(child.id).unwrap().unwrap();
    assert!(child.is_linked());
    assert_eq!(store.get_file_count(child.id).unwrap(), 0);
    assert_eq!(virtual_file_count(&store, &child).unwrap(), 2);
    assert_eq!(resolve_owner(&store, child).unwrap().id, parent.id);
}

#[test]
fn test_link_to_unknown_parent() {
    let store = MemoryStore::new();
    let child = store.add_source("sub", Path::new("/data/sub")).unwrap();
    let err = store
        .link_source_to_parent(child.id, SourceId::new(999))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownSource(_)));
}

#[test]
fn test_placements_require_known_source() {
    let store = MemoryStore::new();
    let err = store
        .put_placements(SourceId::new(7), Vec::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownSource(_)));
}
