//! Iterative directory walker with streaming output.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use foldex_core::{ExclusionPolicy, IndexConfig, ScanError, ScanWarning, mtime_millis};

/// A file discovered by the walker.
#[derive(Debug)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub metadata: Metadata,
    /// Depth of the file below the root (root-level files have depth 1).
    pub depth: u32,
}

/// A directory whose direct children have all been read.
#[derive(Debug, Clone)]
pub struct WalkedFolder {
    pub path: PathBuf,
    /// Depth below the root (root-level folders have depth 1).
    pub depth: u32,
    /// Non-excluded direct children that could be statted.
    pub item_count: u64,
    pub modified_ms: i64,
}

/// Something the walker reports to its caller.
#[derive(Debug)]
pub enum WalkEvent {
    File(WalkedFile),
    Folder(WalkedFolder),
    Warning(ScanWarning),
}

/// Summary counters for a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub total_files: u64,
    pub total_dirs: u64,
    pub total_size: u64,
    pub max_depth: u32,
    pub warnings: u64,
}

impl WalkStats {
    fn record_file(&mut self, size: u64, depth: u32) {
        self.total_files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);
    }

    fn record_dir(&mut self, depth: u32) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// Directory waiting on the explicit stack.
struct PendingDir {
    path: PathBuf,
    depth: u32,
    modified_ms: i64,
}

/// Depth-first walker driven by an explicit stack.
///
/// Memory use is bounded by stack depth times directory fan-out; nothing is
/// buffered beyond the listing of the directory being read.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    policy: ExclusionPolicy,
    max_depth: u32,
}

impl TreeWalker {
    /// Create a walker with an explicit policy and depth limit.
    pub fn new(policy: ExclusionPolicy, max_depth: u32) -> Self {
        Self { policy, max_depth }
    }

    /// Create a walker from index settings.
    pub fn from_config(config: &IndexConfig) -> Result<Self, ScanError> {
        Ok(Self::new(config.exclusion_policy()?, config.max_depth))
    }

    /// Walk `root`, reporting every non-excluded file and directory once.
    ///
    /// Files are reported as soon as their directory is listed. A directory
    /// is reported after its direct children have been read; the root
    /// itself is never reported. Unreadable entries and subtrees beyond the
    /// depth limit produce a warning and are skipped.
    ///
    /// Fails only when the root itself cannot be listed; nothing has been
    /// reported in that case.
    pub fn walk<F>(&self, root: &Path, mut on_event: F) -> Result<WalkStats, ScanError>
    where
        F: FnMut(WalkEvent),
    {
        let mut stats = WalkStats::default();
        let mut stack = vec![PendingDir {
            path: root.to_path_buf(),
            depth: 0,
            modified_ms: 0,
        }];

        while let Some(dir) = stack.pop() {
            let listing = match fs::read_dir(&dir.path) {
                Ok(listing) => listing,
                Err(err) if dir.depth == 0 => return Err(ScanError::io(&dir.path, err)),
                Err(err) => {
                    stats.warnings += 1;
                    on_event(WalkEvent::Warning(ScanWarning::read_error(&dir.path, &err)));
                    continue;
                }
            };

            let mut entries = Vec::new();
            for entry in listing {
                match entry {
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        stats.warnings += 1;
                        on_event(WalkEvent::Warning(ScanWarning::read_error(&dir.path, &err)));
                    }
                }
            }
            entries.sort_by_key(|e| e.file_name());

            let child_depth = dir.depth + 1;
            let mut item_count = 0u64;
            let mut subdirs = Vec::new();

            for entry in entries {
                let name = entry.file_name();
                if self.policy.is_excluded_name(&name.to_string_lossy()) {
                    continue;
                }

                let path = entry.path();
                // DirEntry::metadata does not follow symlinks.
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(err) => {
                        stats.warnings += 1;
                        on_event(WalkEvent::Warning(ScanWarning::metadata_error(&path, &err)));
                        continue;
                    }
                };

                let file_type = metadata.file_type();
                if file_type.is_dir() {
                    item_count += 1;
                    if child_depth > self.max_depth {
                        stats.warnings += 1;
                        on_event(WalkEvent::Warning(ScanWarning::depth_exceeded(
                            &path,
                            self.max_depth,
                        )));
                        continue;
                    }
                    subdirs.push(PendingDir {
                        path,
                        depth: child_depth,
                        modified_ms: metadata.modified().map(mtime_millis).unwrap_or(0),
                    });
                } else if file_type.is_file() {
                    item_count += 1;
                    stats.record_file(metadata.len(), child_depth);
                    on_event(WalkEvent::File(WalkedFile {
                        path,
                        metadata,
                        depth: child_depth,
                    }));
                }
            }

            if dir.depth > 0 {
                stats.record_dir(dir.depth);
                on_event(WalkEvent::Folder(WalkedFolder {
                    path: dir.path,
                    depth: dir.depth,
                    item_count,
                    modified_ms: dir.modified_ms,
                }));
            }

            // Reverse so the first subdirectory in listing order is popped next.
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(stats)
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(ExclusionPolicy::default(), IndexConfig::default().max_depth)
    }
}
