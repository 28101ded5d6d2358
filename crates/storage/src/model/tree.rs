//! The in-memory node arena behind a [`Storage`](crate::Storage).
//!
//! Nodes are never removed from the arena; removing a child unlinks it from
//! its parent and marks it disposed so stale handles fail fast instead of
//! reading data that no longer belongs to the tree.

use crate::content::Content;
use crate::error::{ErrorKind, Result};
use crate::name::{canonicalize_name, clean_name};
use crate::version::VersionLog;
use crate::Storage;
use std::collections::HashMap;
use time::UtcDateTime;
use uuid::Uuid;

/// Index of a folder node inside its storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(pub(crate) usize);

/// Index of a file node inside its storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) usize);

pub(crate) const ROOT: FolderId = FolderId(0);

pub(crate) struct FolderNode {
    pub(crate) name: String,
    pub(crate) parent: Option<FolderId>,
    pub(crate) folders: HashMap<String, FolderId>,
    pub(crate) files: HashMap<String, FileId>,
    pub(crate) last_processed: Option<UtcDateTime>,
    pub(crate) error_status: Option<String>,
    pub(crate) disposed: bool,
}

pub(crate) struct FileNode {
    pub(crate) name: String,
    pub(crate) parent: FolderId,
    pub(crate) content: Option<Content>,
    pub(crate) modified: Option<UtcDateTime>,
    pub(crate) last_loaded_or_saved: Option<UtcDateTime>,
    pub(crate) versions: Vec<Uuid>,
    pub(crate) error: Option<String>,
    pub(crate) disposed: bool,
    pub(crate) container: Option<Container>,
}

/// A decoded package container attached to the file it came from.
#[derive(Clone)]
pub(crate) struct Container {
    pub(crate) storage: Storage,
    pub(crate) archive: std::sync::Arc<crate::backend::ArchiveBackend>,
}

impl FolderNode {
    fn new(name: String, parent: Option<FolderId>) -> Self {
        Self {
            name,
            parent,
            folders: HashMap::new(),
            files: HashMap::new(),
            last_processed: None,
            error_status: None,
            disposed: false,
        }
    }
}

impl FileNode {
    fn new(name: String, parent: FolderId) -> Self {
        Self {
            name,
            parent,
            content: None,
            modified: None,
            last_loaded_or_saved: None,
            versions: Vec::new(),
            error: None,
            disposed: false,
            container: None,
        }
    }

    /// Modified since the last load or save.
    pub(crate) fn needs_save(&self) -> bool {
        match (self.modified, self.last_loaded_or_saved) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(modified), Some(stamp)) => modified >= stamp,
        }
    }

    /// Record a load or save. The stamp is kept strictly after `modified` so
    /// a clock that hasn't ticked since the last edit still reads as clean.
    pub(crate) fn stamp_clean(&mut self) -> UtcDateTime {
        let now = UtcDateTime::now();
        let stamp = match self.modified {
            Some(modified) if modified >= now => modified + time::Duration::nanoseconds(1),
            _ => now,
        };
        self.last_loaded_or_saved = Some(stamp);
        stamp
    }
}

pub(crate) struct Tree {
    folders: Vec<FolderNode>,
    files: Vec<FileNode>,
    pub(crate) versions: VersionLog,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self {
            folders: vec![FolderNode::new(String::new(), None)],
            files: Vec::new(),
            versions: VersionLog::default(),
        }
    }

    pub(crate) fn folder(&self, id: FolderId) -> Result<&FolderNode> {
        match self.folders.get(id.0) {
            Some(node) if !node.disposed => Ok(node),
            _ => exn::bail!(ErrorKind::Disposed("folder".into())),
        }
    }

    pub(crate) fn folder_mut(&mut self, id: FolderId) -> Result<&mut FolderNode> {
        match self.folders.get_mut(id.0) {
            Some(node) if !node.disposed => Ok(node),
            _ => exn::bail!(ErrorKind::Disposed("folder".into())),
        }
    }

    pub(crate) fn file(&self, id: FileId) -> Result<&FileNode> {
        match self.files.get(id.0) {
            Some(node) if !node.disposed => Ok(node),
            _ => exn::bail!(ErrorKind::Disposed("file".into())),
        }
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Result<&mut FileNode> {
        match self.files.get_mut(id.0) {
            Some(node) if !node.disposed => Ok(node),
            _ => exn::bail!(ErrorKind::Disposed("file".into())),
        }
    }

    /// `/`-delimited path from the root, starting and ending with `/`.
    pub(crate) fn folder_path(&self, id: FolderId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = self.folder(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.folder(parent)?;
        }
        names.reverse();
        Ok(crate::path::folder_path(&names))
    }

    pub(crate) fn file_path(&self, id: FileId) -> Result<String> {
        let node = self.file(id)?;
        Ok(format!("{}{}", self.folder_path(node.parent)?, node.name))
    }

    /// Get or create a child folder. Returns whether it was created.
    pub(crate) fn ensure_folder(&mut self, parent: FolderId, name: &str) -> Result<(FolderId, bool)> {
        let key = canonicalize_name(name);
        if key.is_empty() {
            exn::bail!(ErrorKind::InvalidPath(name.to_string()));
        }
        if let Some(id) = self.folder(parent)?.folders.get(&key) {
            return Ok((*id, false));
        }
        let id = FolderId(self.folders.len());
        self.folders.push(FolderNode::new(clean_name(name), Some(parent)));
        self.folder_mut(parent)?.folders.insert(key, id);
        Ok((id, true))
    }

    /// Get or create a child file. Returns whether it was created.
    pub(crate) fn ensure_file(&mut self, parent: FolderId, name: &str) -> Result<(FileId, bool)> {
        let key = canonicalize_name(name);
        if key.is_empty() {
            exn::bail!(ErrorKind::InvalidPath(name.to_string()));
        }
        if let Some(id) = self.folder(parent)?.files.get(&key) {
            return Ok((*id, false));
        }
        let id = FileId(self.files.len());
        self.files.push(FileNode::new(clean_name(name), parent));
        self.folder_mut(parent)?.files.insert(key, id);
        Ok((id, true))
    }

    pub(crate) fn child_folder(&self, parent: FolderId, name: &str) -> Result<Option<FolderId>> {
        Ok(self.folder(parent)?.folders.get(&canonicalize_name(name)).copied())
    }

    pub(crate) fn child_file(&self, parent: FolderId, name: &str) -> Result<Option<FileId>> {
        Ok(self.folder(parent)?.files.get(&canonicalize_name(name)).copied())
    }

    /// Children sorted by display name, so walks are deterministic.
    pub(crate) fn child_folders(&self, parent: FolderId) -> Result<Vec<FolderId>> {
        let node = self.folder(parent)?;
        let mut ids: Vec<FolderId> = node.folders.values().copied().collect();
        ids.sort_by(|a, b| self.folders[a.0].name.cmp(&self.folders[b.0].name));
        Ok(ids)
    }

    pub(crate) fn child_files(&self, parent: FolderId) -> Result<Vec<FileId>> {
        let node = self.folder(parent)?;
        let mut ids: Vec<FileId> = node.files.values().copied().collect();
        ids.sort_by(|a, b| self.files[a.0].name.cmp(&self.files[b.0].name));
        Ok(ids)
    }

    /// Unlink a file from its folder and dispose it. Returns the path it had.
    pub(crate) fn remove_file(&mut self, id: FileId) -> Result<String> {
        let path = self.file_path(id)?;
        let node = self.file_mut(id)?;
        let (parent, key) = (node.parent, canonicalize_name(&node.name));
        Self::dispose_file_node(node);
        self.folder_mut(parent)?.files.remove(&key);
        Ok(path)
    }

    /// Unlink a folder from its parent and dispose the whole subtree. Returns
    /// the paths of every file that was below it.
    pub(crate) fn remove_folder(&mut self, id: FolderId) -> Result<Vec<String>> {
        let node = self.folder(id)?;
        let (parent, key) = (node.parent, canonicalize_name(&node.name));
        let removed = self.dispose_folder(id)?;
        if let Some(parent) = parent {
            self.folder_mut(parent)?.folders.remove(&key);
        }
        Ok(removed)
    }

    /// Dispose a folder and everything beneath it without unlinking it.
    pub(crate) fn dispose_folder(&mut self, id: FolderId) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for file in self.child_files(id)? {
            removed.push(self.file_path(file)?);
            Self::dispose_file_node(self.file_mut(file)?);
        }
        for folder in self.child_folders(id)? {
            removed.extend(self.dispose_folder(folder)?);
        }
        let node = self.folder_mut(id)?;
        node.folders.clear();
        node.files.clear();
        node.disposed = true;
        Ok(removed)
    }

    fn dispose_file_node(node: &mut FileNode) {
        node.disposed = true;
        node.content = None;
        if let Some(container) = node.container.take() {
            container.storage.dispose();
        }
    }

    /// Whether any file at or below `id` has unsaved changes.
    pub(crate) fn subtree_needs_save(&self, id: FolderId) -> Result<bool> {
        let node = self.folder(id)?;
        for file in node.files.values() {
            if self.file(*file)?.needs_save() {
                return Ok(true);
            }
        }
        for folder in node.folders.values() {
            if self.subtree_needs_save(*folder)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Mark every node disposed.
    pub(crate) fn dispose_all(&mut self) {
        for node in &mut self.files {
            Self::dispose_file_node(node);
        }
        for node in &mut self.folders {
            node.folders.clear();
            node.files.clear();
            node.disposed = true;
        }
        self.versions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_is_idempotent_over_canonical_names() {
        let mut tree = Tree::new();
        let (a, created) = tree.ensure_folder(ROOT, "My%20Pack").unwrap();
        assert!(created);
        let (b, created) = tree.ensure_folder(ROOT, " /My Pack/ ").unwrap();
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(tree.folder_path(a).unwrap(), "/My Pack/");
    }

    #[test]
    fn test_reserved_name_keeps_display_name() {
        let mut tree = Tree::new();
        let (file, _) = tree.ensure_file(ROOT, "constructor").unwrap();
        assert_eq!(tree.file_path(file).unwrap(), "/constructor");
        assert_eq!(tree.child_file(ROOT, "__constructor").unwrap(), Some(file));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut tree = Tree::new();
        let err = tree.ensure_file(ROOT, " / ").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_remove_folder_disposes_subtree() {
        let mut tree = Tree::new();
        let (a, _) = tree.ensure_folder(ROOT, "a").unwrap();
        let (b, _) = tree.ensure_folder(a, "b").unwrap();
        let (file, _) = tree.ensure_file(b, "x.json").unwrap();
        let removed = tree.remove_folder(a).unwrap();
        assert_eq!(removed, vec!["/a/b/x.json".to_string()]);
        assert!(tree.file(file).is_err());
        assert!(tree.folder(b).is_err());
        assert!(tree.child_folder(ROOT, "a").unwrap().is_none());
    }

    #[test]
    fn test_needs_save() {
        let mut tree = Tree::new();
        let (id, _) = tree.ensure_file(ROOT, "x.txt").unwrap();
        let node = tree.file_mut(id).unwrap();
        assert!(!node.needs_save());
        node.modified = Some(UtcDateTime::now());
        assert!(node.needs_save());
        node.stamp_clean();
        assert!(!node.needs_save());
    }
}
