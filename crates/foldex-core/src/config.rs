//! Indexing configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ScanError;
use crate::exclude::ExclusionPolicy;

/// What a crawl does after a failed write or a skipped path during the walk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReconcileMode {
    /// Always reconcile and report `done`; errors are listed in the result.
    #[default]
    BestEffort,
    /// Skip reconciliation after any write failure or walk warning and
    /// report `error`.
    Strict,
}

/// Configuration shared by crawls and watchers.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct IndexConfig {
    /// Records per persistence flush.
    #[builder(default = "100")]
    pub batch_size: usize,

    /// Deepest directory level the walker descends into.
    #[builder(default = "64")]
    pub max_depth: u32,

    /// Files between progress events for small sources.
    #[builder(default = "25")]
    pub progress_interval: u64,

    /// Files between progress events once a source is large.
    #[builder(default = "500")]
    pub large_progress_interval: u64,

    /// Discovered-file count at which a source counts as large.
    #[builder(default = "5000")]
    pub large_source_threshold: u64,

    /// Watcher quiet window in milliseconds.
    #[builder(default = "500")]
    pub debounce_ms: u64,

    /// Extra glob patterns matched against entry names.
    #[builder(default)]
    pub ignore_patterns: Vec<String>,

    /// Reconciliation behaviour after write failures.
    #[builder(default)]
    pub reconcile_mode: ReconcileMode,
}

impl IndexConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.max_depth == Some(0) {
            return Err("max_depth must be at least 1".to_string());
        }
        if self.progress_interval == Some(0) || self.large_progress_interval == Some(0) {
            return Err("progress intervals must be at least 1".to_string());
        }
        Ok(())
    }
}

impl IndexConfig {
    /// Create a new config builder.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Check values that may have come from a config file.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| ScanError::InvalidConfig {
            message: message.to_string(),
        };
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(invalid("max_depth must be at least 1"));
        }
        if self.progress_interval == 0 || self.large_progress_interval == 0 {
            return Err(invalid("progress intervals must be at least 1"));
        }
        self.exclusion_policy().map(|_| ())
    }

    /// Build the exclusion policy for these settings.
    pub fn exclusion_policy(&self) -> Result<ExclusionPolicy, ScanError> {
        ExclusionPolicy::new(&self.ignore_patterns)
    }

    /// Watcher quiet window.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Progress cadence for a crawl that has found `files_found` files.
    pub fn progress_every(&self, files_found: u64) -> u64 {
        if files_found >= self.large_source_threshold {
            self.large_progress_interval
        } else {
            self.progress_interval
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_depth: 64,
            progress_interval: 25,
            large_progress_interval: 500,
            large_source_threshold: 5000,
            debounce_ms: 500,
            ignore_patterns: Vec::new(),
            reconcile_mode: ReconcileMode::BestEffort,
        }
    }
}
