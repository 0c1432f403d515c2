//! Virtual folder trees for foldex.
//!
//! Placements assign indexed files to paths in a virtual namespace. This
//! crate folds a source's placements into a tree of [`VirtualFolder`]s and
//! [`VirtualFile`]s, either all at once or one level at a time.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use foldex_core::{MemoryStore, SourceId};
//! use foldex_virtual::VirtualTreeMaterializer;
//!
//! let store = Arc::new(MemoryStore::new());
//! let materializer = VirtualTreeMaterializer::new(store);
//!
//! // One level below /Finance, subfolders unloaded.
//! for node in materializer.children(SourceId::new(1), "/Finance").unwrap() {
//!     println!("{} ({} files)", node.name(), node.file_count());
//! }
//! ```

mod materializer;
mod node;

pub use materializer::VirtualTreeMaterializer;
pub use node::{VirtualFile, VirtualFolder, VirtualNode};
