//! Core types and traits for foldex.
//!
//! This crate provides the record model shared by the crawler, the live
//! watchers and the virtual tree: sources, file and folder records with
//! their stable identities, the exclusion policy, configuration, error
//! types and the persistence traits with an in-memory implementation.

mod config;
mod error;
mod exclude;
mod identity;
mod model;
pub mod store;

pub use config::{IndexConfig, IndexConfigBuilder, ReconcileMode};
pub use error::{ScanError, ScanWarning, StoreError, WarningKind, WatchError};
pub use exclude::{DEFAULT_DENY_LIST, ExclusionPolicy};
pub use identity::{FileId, FolderId, compute_file_id, compute_folder_id, mtime_millis};
pub use model::{
    ChangeKind, FileRecord, FileStatus, FolderRecord, Placement, Source, SourceId, WatchEvent,
    parent_relative, relative_path,
};
pub use store::{
    IndexStore, MemoryStore, PlacementStore, StoreResult, resolve_owner, virtual_file_count,
};
