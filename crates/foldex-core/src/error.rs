//! Error types for indexing, persistence and watching.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SourceId;

/// Errors that can occur while walking or crawling a source.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A parent source covers this path but has no indexed files yet.
    #[error(
        "Parent source '{parent_name}' ({parent_path}) has not been indexed yet; scan it first"
    )]
    ParentNotIndexed {
        parent_name: String,
        parent_path: PathBuf,
    },

    /// Another scan of the same source is running.
    #[error("A scan of source {source_id} is already in progress")]
    ScanInProgress { source_id: SourceId },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Persistence failed during a scan.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced source is not registered.
    #[error("Unknown source: {0}")]
    UnknownSource(SourceId),

    /// A source with this path is already registered.
    #[error("Source already registered for {path}")]
    DuplicateSource { path: PathBuf },

    /// Snapshot file could not be read or written.
    #[error("Snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be (de)serialized.
    #[error("Snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Backend specific failure.
    #[error("{message}")]
    Backend { message: String },
}

impl StoreError {
    /// Create a backend error from any displayable message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors raised while setting up a filesystem watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Watched path does not exist or is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The native notification backend refused the subscription.
    #[error("Failed to watch {path}: {message}")]
    Subscribe { path: PathBuf, message: String },

    /// Watchers run their timers on a Tokio runtime.
    #[error("No Tokio runtime is available to drive the watcher")]
    NoRuntime,

    /// Watch settings could not be applied.
    #[error(transparent)]
    Config(#[from] ScanError),
}

/// Kind of walk warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory listing.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Subtree is deeper than the configured limit.
    DepthExceeded,
}

/// Non-fatal problem encountered during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning for a failed directory listing.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        let kind = if error.kind() == std::io::ErrorKind::PermissionDenied {
            WarningKind::PermissionDenied
        } else {
            WarningKind::ReadError
        };
        Self {
            message: format!("Cannot read {}: {error}", path.display()),
            path,
            kind,
        }
    }

    /// Create a warning for a failed stat.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Cannot stat {}: {error}", path.display()),
            path,
            kind: WarningKind::MetadataError,
        }
    }

    /// Create a warning for a subtree beyond the depth limit.
    pub fn depth_exceeded(path: impl Into<PathBuf>, max_depth: u32) -> Self {
        let path = path.into();
        Self {
            message: format!(
                "Skipping {}: deeper than the maximum depth of {max_depth}",
                path.display()
            ),
            path,
            kind: WarningKind::DepthExceeded,
        }
    }
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_parent_not_indexed_message_is_actionable() {
        let err = ScanError::ParentNotIndexed {
            parent_name: "data".to_string(),
            parent_path: PathBuf::from("/data"),
        };
        assert!(err.to_string().contains("scan it first"));
    }

    #[test]
    fn test_read_error_warning_kind() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let warning = ScanWarning::read_error("/locked", &denied);
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.message.contains("/locked"));

        let other = std::io::Error::other("boom");
        assert_eq!(
            ScanWarning::read_error("/x", &other).kind,
            WarningKind::ReadError
        );
    }
}
