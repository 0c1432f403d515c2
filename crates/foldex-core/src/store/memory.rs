//! In-process store with an optional JSON snapshot on disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{IndexStore, PlacementStore, StoreResult};
use crate::error::StoreError;
use crate::identity::{FileId, FolderId};
use crate::model::{FileRecord, FolderRecord, Placement, Source, SourceId, WatchEvent};

/// Oldest audit entries are dropped beyond this many.
const EVENT_LOG_LIMIT: usize = 10_000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_source_id: u64,
    sources: BTreeMap<SourceId, Source>,
    /// Files per source. The same physical file may be indexed by more
    /// than one source, so ids are only unique within a source.
    files: HashMap<SourceId, HashMap<FileId, FileRecord>>,
    folders: HashMap<SourceId, HashMap<FolderId, FolderRecord>>,
    events: Vec<WatchEvent>,
    placements: HashMap<SourceId, Vec<Placement>>,
    #[serde(skip)]
    file_paths: HashMap<(SourceId, PathBuf), FileId>,
    #[serde(skip)]
    folder_paths: HashMap<(SourceId, String), FolderId>,
}

impl StoreState {
    fn rebuild_indexes(&mut self) {
        self.file_paths = self
            .files
            .values()
            .flat_map(HashMap::values)
            .map(|f| ((f.source_id, f.path.clone()), f.id.clone()))
            .collect();
        self.folder_paths = self
            .folders
            .values()
            .flat_map(HashMap::values)
            .map(|f| ((f.source_id, f.relative_path.clone()), f.id.clone()))
            .collect();
    }

    fn upsert_file(&mut self, record: &FileRecord) {
        let key = (record.source_id, record.path.clone());
        let mut record = record.clone();
        let files = self.files.entry(record.source_id).or_default();

        if let Some(old_id) = self.file_paths.get(&key) {
            // Same path, possibly a superseded id: replace, keep first sighting.
            if let Some(old) = files.remove(old_id) {
                record.first_seen = old.first_seen.min(record.first_seen);
            }
        }

        self.file_paths.insert(key, record.id.clone());
        files.insert(record.id.clone(), record);
    }

    fn upsert_folder(&mut self, record: &FolderRecord) {
        let key = (record.source_id, record.relative_path.clone());
        let folders = self.folders.entry(record.source_id).or_default();
        if let Some(old_id) = self.folder_paths.get(&key) {
            folders.remove(old_id);
        }
        self.folder_paths.insert(key, record.id.clone());
        folders.insert(record.id.clone(), record.clone());
    }
}

/// Thread-safe store holding the whole index in memory.
///
/// All writes go through one lock, so an upsert and a reconciliation
/// delete touching the same record never interleave.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store that is never written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot, loading it if present.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut state = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice::<StoreState>(&bytes)?
        } else {
            StoreState::default()
        };
        state.rebuild_indexes();

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Path of the backing snapshot, if any.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Replace the placements recorded for a source.
    pub fn put_placements(&self, source: SourceId, placements: Vec<Placement>) -> StoreResult<()> {
        let mut state = self.write();
        if !state.sources.contains_key(&source) {
            return Err(StoreError::UnknownSource(source));
        }
        state.placements.insert(source, placements);
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IndexStore for MemoryStore {
    fn add_source(&self, name: &str, path: &Path) -> StoreResult<Source> {
        let mut state = self.write();
        if state.sources.values().any(|s| s.path == path) {
            return Err(StoreError::DuplicateSource {
                path: path.to_path_buf(),
            });
        }
        state.next_source_id += 1;
        let source = Source::new(SourceId::new(state.next_source_id), name, path);
        state.sources.insert(source.id, source.clone());
        Ok(source)
    }

    fn list_sources(&self) -> StoreResult<Vec<Source>> {
        Ok(self.read().sources.values().cloned().collect())
    }

    fn get_source_by_id(&self, id: SourceId) -> StoreResult<Option<Source>> {
        Ok(self.read().sources.get(&id).cloned())
    }

    fn get_parent_sources(&self, path: &Path) -> StoreResult<Vec<Source>> {
        Ok(self
            .read()
            .sources
            .values()
            .filter(|s| s.path != path && path.starts_with(&s.path))
            .cloned()
            .collect())
    }

    fn link_source_to_parent(&self, id: SourceId, parent: SourceId) -> StoreResult<()> {
        let mut state = self.write();
        if !state.sources.contains_key(&parent) {
            return Err(StoreError::UnknownSource(parent));
        }
        let source = state
            .sources
            .get_mut(&id)
            .ok_or(StoreError::UnknownSource(id))?;
        source.parent_id = Some(parent);
        Ok(())
    }

    fn upsert_file_batch(&self, files: &[FileRecord]) -> StoreResult<()> {
        let mut state = self.write();
        for record in files {
            state.upsert_file(record);
        }
        Ok(())
    }

    fn upsert_folder_batch(&self, folders: &[FolderRecord]) -> StoreResult<()> {
        let mut state = self.write();
        for record in folders {
            state.upsert_folder(record);
        }
        Ok(())
    }

    fn delete_files_not_in_set(
        &self,
        source: SourceId,
        keep: &HashSet<FileId>,
    ) -> StoreResult<usize> {
        let mut state = self.write();
        let StoreState {
            files, file_paths, ..
        } = &mut *state;
        let Some(files) = files.get_mut(&source) else {
            return Ok(0);
        };

        let before = files.len();
        files.retain(|id, record| {
            let kept = keep.contains(id);
            if !kept {
                file_paths.remove(&(source, record.path.clone()));
            }
            kept
        });
        Ok(before - files.len())
    }

    fn delete_folders_not_in_set(
        &self,
        source: SourceId,
        keep: &HashSet<FolderId>,
    ) -> StoreResult<usize> {
        let mut state = self.write();
        let StoreState {
            folders,
            folder_paths,
            ..
        } = &mut *state;
        let Some(folders) = folders.get_mut(&source) else {
            return Ok(0);
        };

        let before = folders.len();
        folders.retain(|id, record| {
            let kept = keep.contains(id);
            if !kept {
                folder_paths.remove(&(source, record.relative_path.clone()));
            }
            kept
        });
        Ok(before - folders.len())
    }

    fn get_file(&self, source: SourceId, id: &FileId) -> StoreResult<Option<FileRecord>> {
        Ok(self
            .read()
            .files
            .get(&source)
            .and_then(|files| files.get(id))
            .cloned())
    }

    fn get_file_by_path(&self, source: SourceId, path: &Path) -> StoreResult<Option<FileRecord>> {
        let state = self.read();
        Ok(state
            .file_paths
            .get(&(source, path.to_path_buf()))
            .and_then(|id| state.files.get(&source)?.get(id))
            .cloned())
    }

    fn find_file_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        Ok(self
            .read()
            .files
            .values()
            .flat_map(HashMap::values)
            .find(|f| f.path == path)
            .cloned())
    }

    fn mark_file_missing(&self, source: SourceId, id: &FileId) -> StoreResult<bool> {
        let mut state = self.write();
        match state.files.get_mut(&source).and_then(|files| files.get_mut(id)) {
            Some(record) => {
                record.status = crate::model::FileStatus::Missing;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_file_count(&self, source: SourceId) -> StoreResult<u64> {
        Ok(self
            .read()
            .files
            .get(&source)
            .map_or(0, |files| files.len() as u64))
    }

    fn get_files(&self, source: SourceId) -> StoreResult<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = self
            .read()
            .files
            .get(&source)
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    fn get_folders(&self, source: SourceId) -> StoreResult<Vec<FolderRecord>> {
        let mut folders: Vec<FolderRecord> = self
            .read()
            .folders
            .get(&source)
            .map(|folders| folders.values().cloned().collect())
            .unwrap_or_default();
        folders.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(folders)
    }

    fn insert_event(&self, event: &WatchEvent) -> StoreResult<()> {
        let mut state = self.write();
        state.events.push(event.clone());
        if state.events.len() > EVENT_LOG_LIMIT {
            let excess = state.events.len() - EVENT_LOG_LIMIT;
            state.events.drain(..excess);
        }
        Ok(())
    }

    fn events_for_source(&self, source: SourceId) -> StoreResult<Vec<WatchEvent>> {
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| e.source_id == source)
            .cloned()
            .collect())
    }

    fn save_sync(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        let bytes = serde_json::to_vec(&*self.read())?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl PlacementStore for MemoryStore {
    fn placements_for_source(&self, source: SourceId) -> StoreResult<Vec<Placement>> {
        Ok(self
            .read()
            .placements
            .get(&source)
            .cloned()
            .unwrap_or_default())
    }
}
