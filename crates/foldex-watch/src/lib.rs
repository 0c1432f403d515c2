//! Live change tracking for foldex sources.
//!
//! A [`ChangeWatcher`] subscribes to native notifications for one source,
//! drops excluded paths, normalizes what remains to add / change / unlink and
//! debounces per path. The [`WatcherManager`] owns the watchers, applies
//! their events to an [`IndexStore`](foldex_core::IndexStore) through a
//! single applier task and broadcasts each applied change.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use foldex_core::{IndexConfig, IndexStore, MemoryStore};
//! use foldex_watch::WatcherManager;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let source = store.add_source("docs", Path::new("/data/docs"))?;
//!
//! let manager = WatcherManager::new(store, IndexConfig::default())?;
//! let mut changes = manager.subscribe();
//! manager.start_watching(source.id);
//!
//! while let Ok(change) = changes.recv().await {
//!     println!("{} {}", change.kind, change.path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod debounce;
mod manager;
mod normalize;
mod watcher;

pub use debounce::Debouncer;
pub use manager::{ChangeNotification, WatcherManager};
pub use normalize::{RawKind, normalize, watched_path};
pub use watcher::ChangeWatcher;
