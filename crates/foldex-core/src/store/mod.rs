//! Persistence seams consumed by the crawler, the watchers and the
//! virtual tree materializer.
//!
//! Implementations must serialize conflicting writes to the same entity
//! (an upsert racing a reconciliation delete), since crawls and watchers
//! share one store.

mod memory;

use std::collections::HashSet;
use std::path::Path;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::identity::{FileId, FolderId};
use crate::model::{FileRecord, FolderRecord, Placement, Source, SourceId, WatchEvent};

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store behind the index.
pub trait IndexStore: Send + Sync {
    /// Register a new source.
    fn add_source(&self, name: &str, path: &Path) -> StoreResult<Source>;

    /// All registered sources.
    fn list_sources(&self) -> StoreResult<Vec<Source>>;

    fn get_source_by_id(&self, id: SourceId) -> StoreResult<Option<Source>>;

    /// Sources whose path is a proper ancestor of `path`.
    fn get_parent_sources(&self, path: &Path) -> StoreResult<Vec<Source>>;

    fn link_source_to_parent(&self, id: SourceId, parent: SourceId) -> StoreResult<()>;

    /// Insert or replace files, keyed by (source, path).
    fn upsert_file_batch(&self, files: &[FileRecord]) -> StoreResult<()>;

    /// Insert or replace folders, keyed by (source, relative path).
    fn upsert_folder_batch(&self, folders: &[FolderRecord]) -> StoreResult<()>;

    fn upsert_file(&self, file: &FileRecord) -> StoreResult<()> {
        self.upsert_file_batch(std::slice::from_ref(file))
    }

    /// Delete every file of `source` whose id is not in `keep`. Returns the
    /// number of records removed.
    fn delete_files_not_in_set(&self, source: SourceId, keep: &HashSet<FileId>)
    -> StoreResult<usize>;

    /// Delete every folder of `source` whose id is not in `keep`.
    fn delete_folders_not_in_set(
        &self,
        source: SourceId,
        keep: &HashSet<FolderId>,
    ) -> StoreResult<usize>;

    /// Look a file id up within one source. Ids derive from path and stat
    /// values only, so overlapping sources can hold the same id.
    fn get_file(&self, source: SourceId, id: &FileId) -> StoreResult<Option<FileRecord>>;

    fn get_file_by_path(&self, source: SourceId, path: &Path) -> StoreResult<Option<FileRecord>>;

    /// Look a path up across all sources.
    fn find_file_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>>;

    /// Flag a file as no longer on disk. Returns `false` if the source does
    /// not hold the id.
    fn mark_file_missing(&self, source: SourceId, id: &FileId) -> StoreResult<bool>;

    fn get_file_count(&self, source: SourceId) -> StoreResult<u64>;

    fn get_files(&self, source: SourceId) -> StoreResult<Vec<FileRecord>>;

    fn get_folders(&self, source: SourceId) -> StoreResult<Vec<FolderRecord>>;

    /// Append to the change audit log.
    fn insert_event(&self, event: &WatchEvent) -> StoreResult<()>;

    fn events_for_source(&self, source: SourceId) -> StoreResult<Vec<WatchEvent>>;

    /// Make everything written so far durable.
    fn save_sync(&self) -> StoreResult<()>;
}

/// Read access to placements produced by an external planner.
pub trait PlacementStore: Send + Sync {
    fn placements_for_source(&self, source: SourceId) -> StoreResult<Vec<Placement>>;
}

/// Follow parent links to the source that physically holds the records.
pub fn resolve_owner<S: IndexStore + ?Sized>(store: &S, source: Source) -> StoreResult<Source> {
    let mut current = source;
    let mut hops = 0;
    while let Some(parent_id) = current.parent_id {
        hops += 1;
        if hops > 64 {
            return Err(StoreError::backend(format!(
                "source link cycle at {}",
                current.id
            )));
        }
        current = store
            .get_source_by_id(parent_id)?
            .ok_or(StoreError::UnknownSource(parent_id))?;
    }
    Ok(current)
}

/// Number of files visible through a source, including a linked source's
/// share of its owner's index.
pub fn virtual_file_count<S: IndexStore + ?Sized>(store: &S, source: &Source) -> StoreResult<u64> {
    if !source.is_linked() {
        return store.get_file_count(source.id);
    }
    let owner = resolve_owner(store, source.clone())?;
    let count = store
        .get_files(owner.id)?
        .iter()
        .filter(|f| f.path.starts_with(&source.path))
        .count();
    Ok(count as u64)
}
