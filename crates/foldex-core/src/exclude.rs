//! Which directory entries are never indexed or watched.

use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::ScanError;

/// Tooling, cache and environment directories that are never walked.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    // VCS
    ".git",
    ".svn",
    ".hg",
    // Dependency caches
    "node_modules",
    "bower_components",
    "Pods",
    ".gradle",
    ".cache",
    // Python environments and caches
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    // IDE
    ".idea",
    ".vscode",
];

/// Decides whether an entry is skipped by the walker and the watchers.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    extra: GlobSet,
}

impl ExclusionPolicy {
    /// Create a policy with extra glob patterns matched against entry names.
    pub fn new(patterns: &[String]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("bad ignore pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let extra = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self { extra })
    }

    /// Check a single entry name.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        name.starts_with('.') || DEFAULT_DENY_LIST.contains(&name) || self.extra.is_match(name)
    }

    /// Check every segment of a path relative to a source root.
    ///
    /// A file inside an excluded directory is excluded even if its own name
    /// is not.
    pub fn is_excluded_path(&self, relative: &Path) -> bool {
        relative.components().any(|c| match c {
            Component::Normal(part) => self.is_excluded_name(&part.to_string_lossy()),
            _ => false,
        })
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            extra: GlobSet::empty(),
        }
    }
}
