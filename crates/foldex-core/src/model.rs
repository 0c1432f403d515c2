//! Index records: sources, files, folders, watch events and placements.

use std::fmt;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::identity::{FileId, FolderId, compute_file_id, compute_folder_id, mtime_millis};

/// Identifier of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl SourceId {
    /// Create a new SourceId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A root directory under management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    /// Display name.
    pub name: String,
    /// Absolute root path.
    pub path: PathBuf,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Source whose index this one shares (virtual mount).
    #[serde(default)]
    pub parent_id: Option<SourceId>,
}

impl Source {
    /// Create an enabled, unlinked source.
    pub fn new(id: SourceId, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            enabled: true,
            created_at: Utc::now(),
            parent_id: None,
        }
    }

    /// Check if this source is a virtual mount inside another source.
    pub fn is_linked(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Whether an indexed file is still on disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Present,
    Missing,
}

/// One physical file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Absolute path.
    pub path: PathBuf,
    pub name: CompactString,
    pub extension: Option<CompactString>,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in milliseconds since the epoch.
    pub modified_ms: i64,
    pub source_id: SourceId,
    /// Path relative to the source root, `/`-separated.
    pub relative_path: String,
    /// Relative path of the containing folder, `None` at the root.
    pub parent_path: Option<String>,
    pub status: FileStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl FileRecord {
    /// Build a present record for `path` from its stat data.
    pub fn from_metadata(
        source_id: SourceId,
        root: &Path,
        path: &Path,
        metadata: &Metadata,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let modified_ms = metadata.modified().map(mtime_millis).unwrap_or(0);
        Self::new(source_id, root, path, metadata.len(), modified_ms, seen_at)
    }

    /// Build a present record from raw stat values.
    pub fn new(
        source_id: SourceId,
        root: &Path,
        path: &Path,
        size: u64,
        modified_ms: i64,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let relative_path = relative_path(root, path);
        let parent_path = parent_relative(&relative_path);
        Self {
            id: compute_file_id(path, size, modified_ms),
            path: path.to_path_buf(),
            name: file_name(path),
            extension: path
                .extension()
                .map(|e| CompactString::new(e.to_string_lossy())),
            size,
            modified_ms,
            source_id,
            relative_path,
            parent_path,
            status: FileStatus::Present,
            first_seen: seen_at,
            last_seen: seen_at,
        }
    }

    /// Check if the file is marked present.
    pub fn is_present(&self) -> bool {
        self.status == FileStatus::Present
    }
}

/// One physical directory below a source root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: FolderId,
    /// Absolute path.
    pub path: PathBuf,
    pub name: CompactString,
    /// Path relative to the source root, `/`-separated.
    pub relative_path: String,
    /// Relative path of the containing folder, `None` at the root.
    pub parent_path: Option<String>,
    /// Depth below the root; root-level folders have depth 1.
    pub depth: u32,
    pub source_id: SourceId,
    /// Number of direct, non-excluded children.
    pub item_count: u64,
    /// Modification time in milliseconds since the epoch.
    pub modified_ms: i64,
}

impl FolderRecord {
    /// Build a folder record.
    pub fn new(
        source_id: SourceId,
        root: &Path,
        path: &Path,
        depth: u32,
        item_count: u64,
        modified_ms: i64,
    ) -> Self {
        let relative_path = relative_path(root, path);
        let parent_path = parent_relative(&relative_path);
        Self {
            id: compute_folder_id(path, modified_ms),
            path: path.to_path_buf(),
            name: file_name(path),
            relative_path,
            parent_path,
            depth,
            source_id,
            item_count,
            modified_ms,
        }
    }
}

/// Normalized kind of a live filesystem change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

/// Audit log entry for an applied change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub source_id: SourceId,
    pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
    /// Create an event stamped with the current time.
    pub fn now(kind: ChangeKind, path: impl Into<PathBuf>, source_id: SourceId) -> Self {
        Self {
            kind,
            path: path.into(),
            source_id,
            timestamp: Utc::now(),
        }
    }
}

/// Externally computed location of a file in the virtual namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub file_id: FileId,
    /// `/`-separated virtual path; the last segment names the file.
    pub virtual_path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub rationale: String,
}

impl Placement {
    /// Create a placement without tags or rationale.
    pub fn new(file_id: FileId, virtual_path: impl Into<String>) -> Self {
        Self {
            file_id,
            virtual_path: virtual_path.into(),
            tags: Vec::new(),
            confidence: 1.0,
            rationale: String::new(),
        }
    }

    /// Non-empty segments of the virtual path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.virtual_path.split('/').filter(|s| !s.is_empty())
    }
}

/// Relative path of `path` below `root`, `/`-separated.
pub fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Parent of a `/`-separated relative path, `None` for root-level entries.
pub fn parent_relative(relative: &str) -> Option<String> {
    relative
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
}

fn file_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_default()
}
