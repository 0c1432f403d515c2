//! Full-source crawl: walk, batch, persist, reconcile.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use foldex_core::{
    FileId, FileRecord, FolderId, FolderRecord, IndexConfig, IndexStore, ReconcileMode,
    ScanError, Source, SourceId, resolve_owner,
};

use crate::progress::{CrawlProgress, CrawlStatus, ProgressTracker};
use crate::walker::{TreeWalker, WalkEvent, WalkedFile, WalkedFolder};

/// Outcome of one crawl. Errors are collected here instead of aborting.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub source_id: SourceId,
    pub status: CrawlStatus,
    pub files_scanned: u64,
    pub folders_scanned: u64,
    pub bytes_scanned: u64,
    pub files_removed: u64,
    pub folders_removed: u64,
    /// Set when the source was linked into a parent instead of walked.
    pub linked_to: Option<SourceId>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl CrawlResult {
    fn empty(source_id: SourceId) -> Self {
        Self {
            source_id,
            status: CrawlStatus::Scanning,
            files_scanned: 0,
            folders_scanned: 0,
            bytes_scanned: 0,
            files_removed: 0,
            folders_removed: 0,
            linked_to: None,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Check if the crawl completed (possibly with collected errors).
    pub fn is_done(&self) -> bool {
        self.status == CrawlStatus::Done
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Crawls sources into an [`IndexStore`].
///
/// Only one crawl per source may run at a time; a second request for the
/// same source returns an error result immediately.
pub struct Crawler<S> {
    store: Arc<S>,
    config: IndexConfig,
    walker: TreeWalker,
    progress_tx: broadcast::Sender<CrawlProgress>,
    active: DashSet<SourceId>,
}

impl<S: IndexStore> Crawler<S> {
    /// Create a crawler writing to `store`.
    pub fn new(store: Arc<S>, config: IndexConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let walker = TreeWalker::from_config(&config)?;
        let (progress_tx, _) = broadcast::channel(256);
        Ok(Self {
            store,
            config,
            walker,
            progress_tx,
            active: DashSet::new(),
        })
    }

    /// Subscribe to crawl progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlProgress> {
        self.progress_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Crawl `source_path` as source `source_id`.
    ///
    /// Never fails: every problem ends up in [`CrawlResult::errors`].
    pub fn scan(&self, source_id: SourceId, source_path: &Path) -> CrawlResult {
        if !self.active.insert(source_id) {
            let mut result = CrawlResult::empty(source_id);
            result.status = CrawlStatus::Error;
            result
                .errors
                .push(ScanError::ScanInProgress { source_id }.to_string());
            return result;
        }
        let _guard = ActiveScan {
            active: &self.active,
            source_id,
        };

        let result = self.run(source_id, source_path);
        tracing::info!(
            source = %source_id,
            status = %result.status,
            files = result.files_scanned,
            folders = result.folders_scanned,
            removed = result.files_removed,
            errors = result.errors.len(),
            "crawl finished"
        );
        result
    }

    fn run(&self, source_id: SourceId, source_path: &Path) -> CrawlResult {
        let tracker = ProgressTracker::new(source_id);
        let mut result = CrawlResult::empty(source_id);

        if let Err(err) = check_root(source_path) {
            return self.fail(result, &tracker, err);
        }

        match self.link_to_parent(source_id, source_path) {
            Ok(Some(parent)) => {
                if let Err(err) = self.store.save_sync() {
                    result.errors.push(err.to_string());
                }
                result.linked_to = Some(parent.id);
                result.status = CrawlStatus::Done;
                result.duration = tracker.elapsed();
                self.publish(tracker.snapshot(
                    CrawlStatus::Done,
                    format!("Linked to {} ({})", parent.name, parent.path.display()),
                ));
                return result;
            }
            Ok(None) => {}
            Err(err) => return self.fail(result, &tracker, err),
        }

        self.publish(tracker.snapshot(
            CrawlStatus::Scanning,
            format!("Scanning {}", source_path.display()),
        ));

        let mut run = CrawlRun::new(self, source_id, source_path, tracker);
        let walked = self.walker.walk(source_path, |event| run.handle(event));
        if let Err(err) = walked {
            // Nothing was seen, so reconciling would wipe the source.
            return self.fail(result, &run.tracker, err);
        }
        run.flush_files();
        run.flush_folders();
        let found = run.tracker.files_found;
        self.publish(
            run.tracker
                .snapshot(CrawlStatus::Indexing, format!("Indexed {found} files")),
        );

        let CrawlRun {
            tracker,
            seen_files,
            seen_folders,
            errors,
            write_failures,
            walk_warnings,
            ..
        } = run;
        result.errors = errors;
        result.files_scanned = tracker.files_found;
        result.folders_scanned = tracker.folders_found;
        result.bytes_scanned = tracker.bytes_found;

        let strict_abort = self.config.reconcile_mode == ReconcileMode::Strict
            && (write_failures > 0 || walk_warnings > 0);
        if strict_abort {
            result.errors.push(format!(
                "Reconciliation skipped: {write_failures} batch write(s) failed, \
                 {walk_warnings} path(s) could not be read"
            ));
        } else {
            self.publish(tracker.snapshot(CrawlStatus::Cleaning, "Removing stale records"));
            match self.store.delete_files_not_in_set(source_id, &seen_files) {
                Ok(removed) => result.files_removed = removed as u64,
                Err(err) => {
                    tracing::warn!(source = %source_id, error = %err, "file reconciliation failed");
                    result.errors.push(format!("File reconciliation failed: {err}"));
                }
            }
            match self.store.delete_folders_not_in_set(source_id, &seen_folders) {
                Ok(removed) => result.folders_removed = removed as u64,
                Err(err) => {
                    tracing::warn!(source = %source_id, error = %err, "folder reconciliation failed");
                    result.errors.push(format!("Folder reconciliation failed: {err}"));
                }
            }
        }

        if let Err(err) = self.store.save_sync() {
            tracing::warn!(error = %err, "saving index failed");
            result.errors.push(format!("Save failed: {err}"));
        }

        result.status = if strict_abort {
            CrawlStatus::Error
        } else {
            CrawlStatus::Done
        };
        result.duration = tracker.elapsed();
        self.publish(tracker.snapshot(
            result.status,
            format!(
                "Indexed {} files, removed {}",
                result.files_scanned, result.files_removed
            ),
        ));
        result
    }

    /// Link the source into the nearest registered ancestor, if any.
    fn link_to_parent(
        &self,
        source_id: SourceId,
        source_path: &Path,
    ) -> Result<Option<Source>, ScanError> {
        let nearest = self
            .store
            .get_parent_sources(source_path)?
            .into_iter()
            .filter(|p| p.id != source_id)
            .max_by_key(|p| p.path.components().count());
        let Some(parent) = nearest else {
            return Ok(None);
        };

        let owner = resolve_owner(self.store.as_ref(), parent.clone())?;
        if self.store.get_file_count(owner.id)? == 0 {
            return Err(ScanError::ParentNotIndexed {
                parent_name: owner.name,
                parent_path: owner.path,
            });
        }

        self.store.link_source_to_parent(source_id, parent.id)?;
        // A linked source never holds records of its own.
        self.store.delete_files_not_in_set(source_id, &HashSet::new())?;
        self.store
            .delete_folders_not_in_set(source_id, &HashSet::new())?;
        tracing::info!(source = %source_id, parent = %parent.id, "linked source to parent");
        Ok(Some(parent))
    }

    fn fail(&self, mut result: CrawlResult, tracker: &ProgressTracker, err: ScanError) -> CrawlResult {
        tracing::warn!(source = %result.source_id, error = %err, "crawl failed");
        let message = err.to_string();
        result.status = CrawlStatus::Error;
        result.errors.push(message.clone());
        result.duration = tracker.elapsed();
        self.publish(tracker.snapshot(CrawlStatus::Error, message));
        result
    }

    fn publish(&self, progress: CrawlProgress) {
        // No subscribers is fine.
        let _ = self.progress_tx.send(progress);
    }
}

impl<S: IndexStore + 'static> Crawler<S> {
    /// Run a crawl on the blocking thread pool.
    ///
    /// The walk performs blocking filesystem calls, so long scans must not
    /// occupy async worker threads.
    pub fn spawn_scan(self: &Arc<Self>, source_id: SourceId, path: PathBuf) -> JoinHandle<CrawlResult> {
        let crawler = Arc::clone(self);
        tokio::task::spawn_blocking(move || crawler.scan(source_id, &path))
    }
}

fn check_root(path: &Path) -> Result<(), ScanError> {
    let metadata = std::fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Removes a source from the active set when its crawl ends.
struct ActiveScan<'a> {
    active: &'a DashSet<SourceId>,
    source_id: SourceId,
}

impl Drop for ActiveScan<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.source_id);
    }
}

/// Mutable state of one walk.
struct CrawlRun<'a, S> {
    crawler: &'a Crawler<S>,
    source_id: SourceId,
    root: &'a Path,
    seen_at: DateTime<Utc>,
    tracker: ProgressTracker,
    files: Vec<FileRecord>,
    folders: Vec<FolderRecord>,
    seen_files: HashSet<FileId>,
    seen_folders: HashSet<FolderId>,
    errors: Vec<String>,
    write_failures: usize,
    /// Entries or subtrees the walk had to skip.
    walk_warnings: usize,
    next_progress_at: u64,
}

impl<'a, S: IndexStore> CrawlRun<'a, S> {
    fn new(
        crawler: &'a Crawler<S>,
        source_id: SourceId,
        root: &'a Path,
        tracker: ProgressTracker,
    ) -> Self {
        let batch_size = crawler.config.batch_size;
        Self {
            crawler,
            source_id,
            root,
            seen_at: Utc::now(),
            tracker,
            files: Vec::with_capacity(batch_size),
            folders: Vec::with_capacity(batch_size),
            seen_files: HashSet::new(),
            seen_folders: HashSet::new(),
            errors: Vec::new(),
            write_failures: 0,
            walk_warnings: 0,
            next_progress_at: crawler.config.progress_interval,
        }
    }

    fn handle(&mut self, event: WalkEvent) {
        match event {
            WalkEvent::File(file) => self.on_file(file),
            WalkEvent::Folder(folder) => self.on_folder(folder),
            WalkEvent::Warning(warning) => {
                tracing::debug!(path = %warning.path.display(), "{}", warning.message);
                self.walk_warnings += 1;
                self.errors.push(warning.message);
            }
        }
    }

    fn on_file(&mut self, file: WalkedFile) {
        let record = FileRecord::from_metadata(
            self.source_id,
            self.root,
            &file.path,
            &file.metadata,
            self.seen_at,
        );
        self.tracker.record_file(file.path, record.size);
        self.seen_files.insert(record.id.clone());
        self.files.push(record);

        if self.files.len() >= self.crawler.config.batch_size {
            self.flush_files();
        }

        let found = self.tracker.files_found;
        if found >= self.next_progress_at {
            self.next_progress_at = found + self.crawler.config.progress_every(found);
            self.crawler.publish(self.tracker.snapshot(
                CrawlStatus::Indexing,
                format!("Indexed {found} files"),
            ));
        }
    }

    fn on_folder(&mut self, folder: WalkedFolder) {
        let record = FolderRecord::new(
            self.source_id,
            self.root,
            &folder.path,
            folder.depth,
            folder.item_count,
            folder.modified_ms,
        );
        self.tracker.record_folder();
        self.seen_folders.insert(record.id.clone());
        self.folders.push(record);

        if self.folders.len() >= self.crawler.config.batch_size {
            self.flush_folders();
        }
    }

    fn flush_files(&mut self) {
        if self.files.is_empty() {
            return;
        }
        match self.crawler.store.upsert_file_batch(&self.files) {
            Ok(()) => {
                tracing::debug!(source = %self.source_id, count = self.files.len(), "flushed file batch");
                self.tracker.record_flushed(self.files.len());
            }
            Err(err) => {
                tracing::warn!(source = %self.source_id, error = %err, "file batch upsert failed");
                self.errors.push(format!("File batch upsert failed: {err}"));
                self.write_failures += 1;
            }
        }
        self.files.clear();
    }

    fn flush_folders(&mut self) {
        if self.folders.is_empty() {
            return;
        }
        match self.crawler.store.upsert_folder_batch(&self.folders) {
            Ok(()) => {
                tracing::debug!(source = %self.source_id, count = self.folders.len(), "flushed folder batch");
            }
            Err(err) => {
                tracing::warn!(source = %self.source_id, error = %err, "folder batch upsert failed");
                self.errors.push(format!("Folder batch upsert failed: {err}"));
                self.write_failures += 1;
            }
        }
        self.folders.clear();
    }
}
