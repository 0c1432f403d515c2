//! Stable identities derived from stat data.
//!
//! Identities never read file content: a file is fingerprinted by its path,
//! size and modification time, a folder by its path and modification time.
//! Rescanning an untouched entity therefore yields the same id, which turns
//! repeated upserts into no-ops.

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identity of a physical file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

/// Identity of a physical directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub String);

impl FileId {
    /// Get the id as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FolderId {
    /// Get the id as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Compute the identity of a file from `path|size|mtime`.
pub fn compute_file_id(path: &Path, size: u64, mtime_ms: i64) -> FileId {
    let input = format!("{}|{size}|{mtime_ms}", path.display());
    FileId(blake3::hash(input.as_bytes()).to_hex().to_string())
}

/// Compute the identity of a folder from `folder|path|mtime`.
pub fn compute_folder_id(path: &Path, mtime_ms: i64) -> FolderId {
    let input = format!("folder|{}|{mtime_ms}", path.display());
    FolderId(blake3::hash(input.as_bytes()).to_hex().to_string())
}

/// Milliseconds since the Unix epoch, negative for pre-epoch times.
pub fn mtime_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_id_is_repeatable() {
        let a = compute_file_id(Path::new("/data/a.txt"), 100, 1_700_000_000_000);
        let b = compute_file_id(Path::new("/data/a.txt"), 100, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_file_id_changes_with_each_input() {
        let base = compute_file_id(Path::new("/data/a.txt"), 100, 1000);
        assert_ne!(base, compute_file_id(Path::new("/data/b.txt"), 100, 1000));
        assert_ne!(base, compute_file_id(Path::new("/data/a.txt"), 101, 1000));
        assert_ne!(base, compute_file_id(Path::new("/data/a.txt"), 100, 1001));
    }

    #[test]
    fn test_folder_id_differs_from_file_id() {
        let folder = compute_folder_id(Path::new("/data/sub"), 1000);
        let file = compute_file_id(Path::new("/data/sub"), 0, 1000);
        assert_ne!(folder.as_str(), file.as_str());
        assert_eq!(folder, compute_folder_id(Path::new("/data/sub"), 1000));
        assert_ne!(folder, compute_folder_id(Path::new("/data/sub"), 1001));
    }

    #[test]
    fn test_mtime_millis() {
        let t = UNIX_EPOCH + Duration::from_millis(1234);
        assert_eq!(mtime_millis(t), 1234);
        let before = UNIX_EPOCH - Duration::from_millis(10);
        assert_eq!(mtime_millis(before), -10);
    }
}
