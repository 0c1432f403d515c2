//! Nodes of a materialized virtual tree.

use compact_str::CompactString;
use serde::Serialize;

use foldex_core::{FileId, FileRecord, Placement};

/// A folder in the virtual namespace.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualFolder {
    pub name: CompactString,
    /// `/`-prefixed virtual path; the root is `/`.
    pub path: String,
    /// Files placed anywhere below this folder.
    pub file_count: u64,
    /// Direct children, or `None` when not loaded.
    pub children: Option<Vec<VirtualNode>>,
}

impl VirtualFolder {
    /// Check if the children have been materialized.
    pub fn is_loaded(&self) -> bool {
        self.children.is_some()
    }

    /// Loaded children, empty when unloaded.
    pub fn children(&self) -> &[VirtualNode] {
        self.children.as_deref().unwrap_or_default()
    }

    /// Direct child with the given name, folders before files.
    pub fn child(&self, name: &str) -> Option<&VirtualNode> {
        self.children().iter().find(|c| c.name() == name)
    }
}

/// A placed file.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualFile {
    pub name: CompactString,
    /// Full virtual path including the file name.
    pub path: String,
    pub file_id: FileId,
    /// Indexed record, if the id is still known.
    pub file: Option<FileRecord>,
    pub placement: Placement,
}

/// A node in the virtual tree.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VirtualNode {
    Folder(VirtualFolder),
    File(VirtualFile),
}

impl VirtualNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.name,
            Self::File(file) => &file.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.path,
            Self::File(file) => &file.path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    /// Get file count for folders, 1 for files.
    pub fn file_count(&self) -> u64 {
        match self {
            Self::Folder(folder) => folder.file_count,
            Self::File(_) => 1,
        }
    }

    pub fn as_folder(&self) -> Option<&VirtualFolder> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&VirtualFile> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }
}
