//! Folding placements into a virtual folder tree.

use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexMap;

use foldex_core::{IndexStore, Placement, PlacementStore, SourceId, StoreResult, resolve_owner};

use crate::node::{VirtualFile, VirtualFolder, VirtualNode};

/// Folder being assembled from placements.
#[derive(Debug, Default)]
struct FolderBuilder {
    name: CompactString,
    path: String,
    file_count: u64,
    folders: IndexMap<CompactString, FolderBuilder>,
    /// Files in placement order.
    files: Vec<Placement>,
}

impl FolderBuilder {
    fn root() -> Self {
        Self {
            path: "/".to_string(),
            ..Self::default()
        }
    }

    fn child_path(&self, name: &str) -> String {
        if self.path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        }
    }

    /// Insert a placement below this folder along `folders`.
    fn insert(&mut self, folders: &[&str], placement: Placement) {
        self.file_count += 1;
        let Some((first, rest)) = folders.split_first() else {
            self.files.push(placement);
            return;
        };
        let path = self.child_path(first);
        self.folders
            .entry(CompactString::new(first))
            .or_insert_with(|| FolderBuilder {
                name: CompactString::new(first),
                path,
                ..FolderBuilder::default()
            })
            .insert(rest, placement);
    }

    fn descend(&self, segments: &[&str]) -> Option<&FolderBuilder> {
        segments
            .iter()
            .try_fold(self, |folder, segment| folder.folders.get(*segment))
    }

    /// Materialize direct children; `depth` more folder levels are loaded.
    /// File records are read from `holder`.
    fn children<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        holder: SourceId,
        depth: Option<usize>,
    ) -> StoreResult<Vec<VirtualNode>> {
        let mut folders: Vec<&FolderBuilder> = self.folders.values().collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));

        let mut files = Vec::with_capacity(self.files.len());
        for placement in &self.files {
            let name = placement.segments().last().unwrap_or_default();
            let file = store.get_file(holder, &placement.file_id)?;
            files.push(VirtualFile {
                name: CompactString::new(name),
                path: self.child_path(name),
                file_id: placement.file_id.clone(),
                file,
                placement: placement.clone(),
            });
        }
        // Stable: equal names keep placement order.
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes = Vec::with_capacity(folders.len() + files.len());
        for folder in folders {
            nodes.push(VirtualNode::Folder(folder.materialize(store, holder, depth)?));
        }
        nodes.extend(files.into_iter().map(VirtualNode::File));
        Ok(nodes)
    }

    fn materialize<S: IndexStore + ?Sized>(
        &self,
        store: &S,
        holder: SourceId,
        depth: Option<usize>,
    ) -> StoreResult<VirtualFolder> {
        let children = match depth {
            Some(0) => None,
            Some(n) => Some(self.children(store, holder, Some(n - 1))?),
            None => Some(self.children(store, holder, None)?),
        };
        Ok(VirtualFolder {
            name: self.name.clone(),
            path: self.path.clone(),
            file_count: self.file_count,
            children,
        })
    }
}

/// Builds virtual trees for a source from its placements.
///
/// Only folders named by at least one placement exist. Placements that share
/// a virtual path each keep their own file node.
pub struct VirtualTreeMaterializer<S> {
    store: Arc<S>,
}

impl<S: IndexStore + PlacementStore> VirtualTreeMaterializer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Materialize the whole tree for a source.
    pub fn tree(&self, source_id: SourceId) -> StoreResult<VirtualFolder> {
        let holder = self.holder(source_id)?;
        self.build(source_id)?
            .materialize(self.store.as_ref(), holder, None)
    }

    /// Materialize the direct children of one virtual folder.
    ///
    /// Child folders are returned unloaded but carry their file count. An
    /// unknown path has no children.
    pub fn children(&self, source_id: SourceId, virtual_path: &str) -> StoreResult<Vec<VirtualNode>> {
        let holder = self.holder(source_id)?;
        let root = self.build(source_id)?;
        let segments: Vec<&str> = virtual_path.split('/').filter(|s| !s.is_empty()).collect();
        match root.descend(&segments) {
            Some(folder) => folder.children(self.store.as_ref(), holder, Some(0)),
            None => Ok(Vec::new()),
        }
    }

    /// Source whose index holds the files placed under `source_id`.
    fn holder(&self, source_id: SourceId) -> StoreResult<SourceId> {
        match self.store.get_source_by_id(source_id)? {
            Some(source) => Ok(resolve_owner(self.store.as_ref(), source)?.id),
            None => Ok(source_id),
        }
    }

    fn build(&self, source_id: SourceId) -> StoreResult<FolderBuilder> {
        let mut root = FolderBuilder::root();
        for placement in self.store.placements_for_source(source_id)? {
            let segments: Vec<&str> = placement.segments().collect();
            let Some((_, folders)) = segments.split_last() else {
                tracing::warn!(
                    file = %placement.file_id,
                    path = %placement.virtual_path,
                    "skipping placement without a path"
                );
                continue;
            };
            root.insert(folders, placement.clone());
        }
        tracing::debug!(source = %source_id, files = root.file_count, "built virtual tree");
        Ok(root)
    }
}
