use crate::backend::{FileEntry, FolderEntry, Listing};
use crate::error::{ErrorKind, Result};
use crate::events::StorageEvent;
use crate::model::tree::{FolderId, ROOT};
use crate::model::{File, Storage};
use crate::name::{canonicalize_name, is_usable_file_name};
use crate::path;
use async_stream::try_stream;
use futures::Stream;
use std::collections::HashSet;
use std::fmt;
use time::UtcDateTime;
use tracing::instrument;

/// Handle to a folder node inside a [`Storage`].
///
/// Cheap to clone. A folder's children are only known once it has been
/// [loaded](Self::load); until then only children created in memory with
/// [`ensure_file`](Self::ensure_file)/[`ensure_folder`](Self::ensure_folder)
/// are present.
#[derive(Clone)]
pub struct Folder {
    storage: Storage,
    id: FolderId,
}

impl Folder {
    pub(crate) fn new(storage: Storage, id: FolderId) -> Self {
        Self { storage, id }
    }

    pub fn id(&self) -> FolderId {
        self.id
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.storage.lock()?.folder(self.id)?.name.clone())
    }

    /// Storage-relative path, starting and ending with `/`.
    pub fn path(&self) -> Result<String> {
        self.storage.lock()?.folder_path(self.id)
    }

    pub fn parent(&self) -> Result<Option<Folder>> {
        let parent = self.storage.lock()?.folder(self.id)?.parent;
        Ok(parent.map(|id| Folder::new(self.storage.clone(), id)))
    }

    /// When the backend was last enumerated into this folder.
    pub fn last_processed(&self) -> Result<Option<UtcDateTime>> {
        Ok(self.storage.lock()?.folder(self.id)?.last_processed)
    }

    /// Why the last load failed, if it did.
    pub fn error_status(&self) -> Result<Option<String>> {
        Ok(self.storage.lock()?.folder(self.id)?.error_status.clone())
    }

    pub fn is_disposed(&self) -> bool {
        match self.storage.lock() {
            Ok(tree) => tree.folder(self.id).is_err(),
            Err(_) => true,
        }
    }

    /// Get or create a child file in memory. No I/O.
    pub fn ensure_file(&self, name: &str) -> Result<File> {
        let (id, path) = {
            let mut tree = self.storage.lock()?;
            let (id, created) = tree.ensure_file(self.id, name)?;
            (id, created.then(|| tree.file_path(id)).transpose()?)
        };
        if let Some(path) = path {
            self.storage.emit(StorageEvent::FileAdded { path });
        }
        Ok(File::new(self.storage.clone(), id))
    }

    /// Get or create a child folder in memory. No I/O.
    pub fn ensure_folder(&self, name: &str) -> Result<Folder> {
        let (id, _) = self.storage.lock()?.ensure_folder(self.id, name)?;
        Ok(Folder::new(self.storage.clone(), id))
    }

    /// Child file by name, without loading.
    pub fn file(&self, name: &str) -> Result<Option<File>> {
        let id = self.storage.lock()?.child_file(self.id, name)?;
        Ok(id.map(|id| File::new(self.storage.clone(), id)))
    }

    /// Child folder by name, without loading.
    pub fn folder(&self, name: &str) -> Result<Option<Folder>> {
        let id = self.storage.lock()?.child_folder(self.id, name)?;
        Ok(id.map(|id| Folder::new(self.storage.clone(), id)))
    }

    /// Child files currently in memory, sorted by name.
    pub fn files(&self) -> Result<Vec<File>> {
        let ids = self.storage.lock()?.child_files(self.id)?;
        Ok(ids.into_iter().map(|id| File::new(self.storage.clone(), id)).collect())
    }

    /// Child folders currently in memory, sorted by name.
    pub fn folders(&self) -> Result<Vec<Folder>> {
        let ids = self.storage.lock()?.child_folders(self.id)?;
        Ok(ids.into_iter().map(|id| Folder::new(self.storage.clone(), id)).collect())
    }

    pub fn file_count(&self) -> Result<usize> {
        Ok(self.storage.lock()?.folder(self.id)?.files.len())
    }

    pub fn folder_count(&self) -> Result<usize> {
        Ok(self.storage.lock()?.folder(self.id)?.folders.len())
    }

    /// Enumerate the backend into this folder's children.
    ///
    /// Cached: once a folder has been processed, further calls return the
    /// previous timestamp unless `force` is set. A forced load also drops
    /// children the backend no longer reports, except those holding unsaved
    /// changes. Soft failures are recorded in [`error_status`](Self::error_status)
    /// and the folder is treated as loaded.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name(), path = tracing::field::Empty))]
    pub async fn load(&self, force: bool) -> Result<UtcDateTime> {
        let (path, last_processed) = {
            let tree = self.storage.lock()?;
            (tree.folder_path(self.id)?, tree.folder(self.id)?.last_processed)
        };
        tracing::Span::current().record("path", path.as_str());
        if !force && let Some(last) = last_processed {
            return Ok(last);
        }

        let listing = match self.storage.backend().list(&path).await {
            Ok(listing) => listing,
            Err(err) if err.is_soft() => {
                let message = (*err).to_string();
                tracing::warn!(storage = self.storage.name(), path = %path, error = %message, "folder failed to load");
                let now = UtcDateTime::now();
                let mut tree = self.storage.lock()?;
                let node = tree.folder_mut(self.id)?;
                node.error_status = Some(message);
                node.last_processed = Some(now);
                return Ok(now);
            },
            Err(err) => return Err(err),
        };

        let now = UtcDateTime::now();
        let mut events = Vec::new();
        {
            let mut tree = self.storage.lock()?;
            let mut seen_folders = HashSet::new();
            for entry in &listing.folders {
                if canonicalize_name(&entry.name).is_empty() {
                    continue;
                }
                seen_folders.insert(tree.ensure_folder(self.id, &entry.name)?.0);
            }
            let mut seen_files = HashSet::new();
            for entry in &listing.files {
                if canonicalize_name(&entry.name).is_empty() || !is_usable_file_name(&entry.name) {
                    tracing::trace!(path = %path, name = %entry.name, "skipping unusable file name");
                    continue;
                }
                let (id, created) = tree.ensure_file(self.id, &entry.name)?;
                seen_files.insert(id);
                if created {
                    events.push(StorageEvent::FileAdded { path: tree.file_path(id)? });
                }
            }
            if force {
                for id in tree.child_files(self.id)? {
                    if !seen_files.contains(&id) && !tree.file(id)?.needs_save() {
                        events.push(StorageEvent::FileRemoved { path: tree.remove_file(id)? });
                    }
                }
                for id in tree.child_folders(self.id)? {
                    if !seen_folders.contains(&id) && !tree.subtree_needs_save(id)? {
                        for path in tree.remove_folder(id)? {
                            events.push(StorageEvent::FileRemoved { path });
                        }
                    }
                }
            }
            let node = tree.folder_mut(self.id)?;
            node.last_processed = Some(now);
            node.error_status = None;
        }
        tracing::debug!(files = listing.files.len(), folders = listing.folders.len(), "folder loaded");
        for event in events {
            self.storage.emit(event);
        }
        Ok(now)
    }

    /// Descend to a file, loading folders on the way.
    ///
    /// The path is relative to this folder and must start with `/`. Returns
    /// `None` when any segment is missing.
    pub async fn get_file_from_relative_path(&self, relative: &str) -> Result<Option<File>> {
        let (folder_path, name) = path::split_file_path(relative)?;
        let Some(folder) = self.get_folder_from_relative_path(&folder_path).await? else {
            return Ok(None);
        };
        folder.load(false).await?;
        folder.file(name)
    }

    /// Descend to a folder, loading folders on the way.
    ///
    /// The path is relative to this folder and must start with `/`; `/` is
    /// this folder. Returns `None` when any segment is missing.
    pub async fn get_folder_from_relative_path(&self, relative: &str) -> Result<Option<Folder>> {
        let mut current = self.clone();
        for segment in path::segments(relative)? {
            current.load(false).await?;
            match current.folder(segment)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Descend to a file, creating missing segments in memory. No I/O.
    pub fn ensure_file_from_relative_path(&self, relative: &str) -> Result<File> {
        let (folder_path, name) = path::split_file_path(relative)?;
        self.ensure_folder_from_relative_path(&folder_path)?.ensure_file(name)
    }

    /// Descend to a folder, creating missing segments in memory. No I/O.
    pub fn ensure_folder_from_relative_path(&self, relative: &str) -> Result<Folder> {
        let mut current = self.clone();
        for segment in path::segments(relative)? {
            current = current.ensure_folder(segment)?;
        }
        Ok(current)
    }

    /// Persist every file below this folder that needs saving.
    ///
    /// Folders whose last load failed are skipped. Returns the number of
    /// files written.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name()))]
    pub async fn save_all(&self) -> Result<usize> {
        self.storage.ensure_writable()?;
        let (path, files, folders) = {
            let tree = self.storage.lock()?;
            let mut files = Vec::new();
            for id in tree.child_files(self.id)? {
                if tree.file(id)?.needs_save() {
                    files.push(File::new(self.storage.clone(), id));
                }
            }
            let mut folders = Vec::new();
            for id in tree.child_folders(self.id)? {
                if tree.folder(id)?.error_status.is_none() {
                    folders.push(Folder::new(self.storage.clone(), id));
                }
            }
            (tree.folder_path(self.id)?, files, folders)
        };
        let mut saved = 0;
        for file in files {
            file.save_content().await?;
            saved += 1;
        }
        for folder in folders {
            saved += Box::pin(folder.save_all()).await?;
        }
        let listing = self.listing()?;
        self.storage.backend().save_folder(&path, &listing, false).await?;
        Ok(saved)
    }

    /// Make sure the folder exists on the backend.
    pub async fn ensure_exists(&self) -> Result<()> {
        self.storage.ensure_writable()?;
        let path = self.path()?;
        self.storage.backend().create_folder(&path).await
    }

    /// Delete a child file from the backend and the tree.
    ///
    /// Returns `false` if there was no such child.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name()))]
    pub async fn delete_file(&self, name: &str) -> Result<bool> {
        self.storage.ensure_writable()?;
        let Some(file) = self.file(name)? else {
            return Ok(false);
        };
        let path = file.path()?;
        self.storage.backend().delete_file(&path).await?;
        let path = self.storage.lock()?.remove_file(file.id())?;
        tracing::debug!(path = %path, "file deleted");
        self.storage.emit(StorageEvent::FileRemoved { path });
        Ok(true)
    }

    /// Delete this folder and everything beneath it from the backend and
    /// the tree. The root folder cannot be deleted.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name()))]
    pub async fn delete_this_folder(&self) -> Result<()> {
        self.storage.ensure_writable()?;
        if self.is_root() {
            exn::bail!(ErrorKind::InvalidPath("/".into()));
        }
        let path = self.path()?;
        self.storage.backend().delete_folder(&path).await?;
        let removed = self.storage.lock()?.remove_folder(self.id)?;
        tracing::debug!(path = %path, files = removed.len(), "folder deleted");
        for path in removed {
            self.storage.emit(StorageEvent::FileRemoved { path });
        }
        Ok(())
    }

    /// Move this folder to `new_path` (relative to the storage root).
    ///
    /// Implemented as a recursive copy followed by a delete, so it works on
    /// every backend. Returns the folder at the new location.
    pub async fn move_to(&self, new_path: &str) -> Result<Folder> {
        self.storage.ensure_writable()?;
        let from = self.path()?;
        let destination = path::folder_path(&path::segments(new_path)?);
        if self.is_root() || destination.starts_with(&from) {
            exn::bail!(ErrorKind::InvalidPath(new_path.to_string()));
        }
        let target = self.storage.root_folder().ensure_folder_from_relative_path(&destination)?;
        copy_into(self, &target).await?;
        self.delete_this_folder().await?;
        let to = target.path()?;
        tracing::info!(storage = self.storage.name(), from = %from, to = %to, "folder moved");
        self.storage.emit(StorageEvent::FolderMoved { from, to });
        Ok(target)
    }

    /// Re-read this subtree after something outside the storage changed it.
    ///
    /// Folders that were loaded are reloaded with `force`; files whose
    /// content was loaded and has no unsaved changes are re-read.
    pub async fn reload_after_external_update(&self) -> Result<()> {
        self.load(true).await?;
        for file in self.files()? {
            if file.last_loaded_or_saved()?.is_some() && !file.needs_save()? {
                file.load_content(true).await?;
            }
        }
        for folder in self.folders()? {
            if folder.last_processed()?.is_some() {
                Box::pin(folder.reload_after_external_update()).await?;
            }
        }
        Ok(())
    }

    /// Every file below this folder, depth first, loading folders as the
    /// walk reaches them.
    pub fn files_recursive(&self) -> impl Stream<Item = Result<File>> + '_ {
        try_stream! {
            let mut stack = vec![self.clone()];
            while let Some(folder) = stack.pop() {
                folder.load(false).await?;
                for file in folder.files()? {
                    yield file;
                }
                let mut children = folder.folders()?;
                children.reverse();
                stack.extend(children);
            }
        }
    }

    /// Release this folder and its subtree. Disposing the root disposes the
    /// whole storage. Nothing is deleted from the backend.
    pub fn dispose(&self) -> Result<()> {
        if self.is_root() {
            self.storage.dispose();
            return Ok(());
        }
        let removed = self.storage.lock()?.remove_folder(self.id)?;
        for path in removed {
            self.storage.emit(StorageEvent::FileRemoved { path });
        }
        Ok(())
    }

    /// The in-memory view of this folder, as persisted by listing-based
    /// backends.
    pub(crate) fn listing(&self) -> Result<Listing> {
        let tree = self.storage.lock()?;
        let mut listing = Listing::default();
        for id in tree.child_files(self.id)? {
            let node = tree.file(id)?;
            listing.files.push(FileEntry {
                name: node.name.clone(),
                size: node.content.as_ref().map(|content| content.len() as u64),
                modified: node.modified.or(node.last_loaded_or_saved),
            });
        }
        for id in tree.child_folders(self.id)? {
            let node = tree.folder(id)?;
            listing.folders.push(FolderEntry {
                name: node.name.clone(),
                file_count: Some(node.files.len() as u64),
                modified: node.last_processed,
            });
        }
        Ok(listing)
    }
}

async fn copy_into(source: &Folder, target: &Folder) -> Result<()> {
    source.load(false).await?;
    target.ensure_exists().await?;
    for file in source.files()? {
        file.load_content(false).await?;
        if let Some(content) = file.content()? {
            let copy = target.ensure_file(&file.name()?)?;
            copy.set_content(content)?;
            copy.save_content().await?;
        }
    }
    for folder in source.folders()? {
        let copy = target.ensure_folder(&folder.name()?)?;
        Box::pin(copy_into(&folder, &copy)).await?;
    }
    Ok(())
}

impl PartialEq for Folder {
    fn eq(&self, other: &Self) -> bool {
        self.storage == other.storage && self.id == other.id
    }
}

impl Eq for Folder {}

impl fmt::Debug for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Folder")
            .field("storage", &self.storage.id())
            .field("path", &self.path().unwrap_or_default())
            .finish()
    }
}
