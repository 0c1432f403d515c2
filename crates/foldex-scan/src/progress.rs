//! Crawl progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display;

use foldex_core::SourceId;

/// Phase of a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CrawlStatus {
    /// Validating the source and starting the walk.
    Scanning,
    /// Walking and writing batches.
    Indexing,
    /// Removing records for entities no longer on disk.
    Cleaning,
    Done,
    Error,
}

impl CrawlStatus {
    /// Check if the crawl has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Progress information during a crawl.
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub source_id: SourceId,
    pub status: CrawlStatus,
    /// Files discovered so far.
    pub files_found: u64,
    /// Folders discovered so far.
    pub folders_found: u64,
    /// Files written to the store so far.
    pub files_processed: u64,
    /// File most recently discovered.
    pub current_file: Option<PathBuf>,
    /// Human-readable status line.
    pub message: String,
    /// Time elapsed since the crawl started.
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Calculate discovery rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_found as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Internal progress tracker with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    source_id: SourceId,
    start_time: Instant,
    pub(crate) files_found: u64,
    pub(crate) folders_found: u64,
    pub(crate) files_processed: u64,
    pub(crate) bytes_found: u64,
    current_file: Option<PathBuf>,
}

impl ProgressTracker {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            start_time: Instant::now(),
            files_found: 0,
            folders_found: 0,
            files_processed: 0,
            bytes_found: 0,
            current_file: None,
        }
    }

    pub fn record_file(&mut self, path: PathBuf, size: u64) {
        self.files_found += 1;
        self.bytes_found += size;
        self.current_file = Some(path);
    }

    pub fn record_folder(&mut self) {
        self.folders_found += 1;
    }

    pub fn record_flushed(&mut self, files: usize) {
        self.files_processed += files as u64;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self, status: CrawlStatus, message: impl Into<String>) -> CrawlProgress {
        CrawlProgress {
            source_id: self.source_id,
            status,
            files_found: self.files_found,
            folders_found: self.folders_found,
            files_processed: self.files_processed,
            current_file: self.current_file.clone(),
            message: message.into(),
            elapsed: self.start_time.elapsed(),
        }
    }
}
