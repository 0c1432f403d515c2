//! Source crawling engine for foldex.
//!
//! # Overview
//!
//! `foldex-scan` walks a registered source and keeps the index in step with
//! what is on disk:
//!
//! - **Streaming walk** over an explicit stack, with exclusion rules and a
//!   depth limit
//! - **Batched writes** through any [`IndexStore`](foldex_core::IndexStore)
//! - **Reconciliation** that removes records for entities no longer present
//! - **Progress updates** via broadcast channels
//! - **Parent linking** for sources nested inside an indexed source
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use foldex_core::{IndexConfig, IndexStore, MemoryStore};
//! use foldex_scan::Crawler;
//!
//! let store = Arc::new(MemoryStore::new());
//! let source = store.add_source("photos", Path::new("/data/photos")).unwrap();
//!
//! let crawler = Crawler::new(store, IndexConfig::default()).unwrap();
//! let result = crawler.scan(source.id, &source.path);
//!
//! println!("Indexed {} files", result.files_scanned);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use foldex_core::{IndexConfig, MemoryStore};
//! # use foldex_scan::Crawler;
//! # let crawler = Crawler::new(Arc::new(MemoryStore::new()), IndexConfig::default()).unwrap();
//! let mut progress_rx = crawler.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("{}: {}", progress.status, progress.message);
//!     }
//! });
//! ```

mod crawler;
mod progress;
mod walker;

pub use crawler::{CrawlResult, Crawler};
pub use progress::{CrawlProgress, CrawlStatus};
pub use walker::{TreeWalker, WalkEvent, WalkStats, WalkedFile, WalkedFolder};

// Re-export core types for convenience
pub use foldex_core::{IndexConfig, ScanError, ScanWarning, WarningKind};
