use crate::backend::ArchiveBackend;
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::events::StorageEvent;
use crate::model::tree::{Container, FileId};
use crate::model::{Folder, Storage};
use quarry_archive::{Archive, PackageKind};
use std::fmt;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Identity of a file across every storage in the process.
///
/// Used to key side tables such as [`Attachments`](crate::Attachments).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub storage: u64,
    pub file: FileId,
}

/// Handle to a file node inside a [`Storage`].
///
/// Cheap to clone. Content is never loaded implicitly: call
/// [`load_content`](Self::load_content) before reading it.
#[derive(Clone)]
pub struct File {
    storage: Storage,
    id: FileId,
}

impl File {
    pub(crate) fn new(storage: Storage, id: FileId) -> Self {
        Self { storage, id }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn key(&self) -> FileKey {
        FileKey { storage: self.storage.id(), file: self.id }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.storage.lock()?.file(self.id)?.name.clone())
    }

    /// Storage-relative path (`/folder/name.ext`).
    pub fn path(&self) -> Result<String> {
        self.storage.lock()?.file_path(self.id)
    }

    pub fn folder(&self) -> Result<Folder> {
        let parent = self.storage.lock()?.file(self.id)?.parent;
        Ok(Folder::new(self.storage.clone(), parent))
    }

    pub fn encoding(&self) -> Result<Encoding> {
        Ok(Encoding::for_name(&self.name()?))
    }

    /// Content as last loaded or set. `None` if never loaded or nonexistent.
    pub fn content(&self) -> Result<Option<Content>> {
        Ok(self.storage.lock()?.file(self.id)?.content.clone())
    }

    pub fn modified(&self) -> Result<Option<UtcDateTime>> {
        Ok(self.storage.lock()?.file(self.id)?.modified)
    }

    pub fn last_loaded_or_saved(&self) -> Result<Option<UtcDateTime>> {
        Ok(self.storage.lock()?.file(self.id)?.last_loaded_or_saved)
    }

    /// Modified and not yet saved since.
    pub fn needs_save(&self) -> Result<bool> {
        Ok(self.storage.lock()?.file(self.id)?.needs_save())
    }

    pub fn is_in_error_state(&self) -> Result<bool> {
        Ok(self.storage.lock()?.file(self.id)?.error.is_some())
    }

    pub fn error_state_message(&self) -> Result<Option<String>> {
        Ok(self.storage.lock()?.file(self.id)?.error.clone())
    }

    /// Ids of this file's entries in the storage's version log, oldest first.
    pub fn versions(&self) -> Result<Vec<Uuid>> {
        Ok(self.storage.lock()?.file(self.id)?.versions.clone())
    }

    pub fn is_disposed(&self) -> bool {
        match self.storage.lock() {
            Ok(tree) => tree.file(self.id).is_err(),
            Err(_) => true,
        }
    }

    /// Read the content from the backend.
    ///
    /// Cached: a file that was already loaded or saved, or that holds unsaved
    /// changes, is not re-read unless `force` is set. A file the backend does
    /// not have loads as `None`. Soft failures put the file in an error state
    /// instead of failing; JSON files whose text does not parse keep their
    /// content but are flagged.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name(), path = tracing::field::Empty))]
    pub async fn load_content(&self, force: bool) -> Result<UtcDateTime> {
        let (path, name, stamp, dirty) = {
            let tree = self.storage.lock()?;
            let node = tree.file(self.id)?;
            (tree.file_path(self.id)?, node.name.clone(), node.last_loaded_or_saved, node.needs_save())
        };
        tracing::Span::current().record("path", path.as_str());
        if !force && (dirty || stamp.is_some()) {
            return Ok(stamp.unwrap_or_else(UtcDateTime::now));
        }

        let result = self.storage.backend().read(&path, Encoding::for_name(&name)).await;
        let mut tree = self.storage.lock()?;
        let node = tree.file_mut(self.id)?;
        match result {
            Ok(content) => {
                node.error = json_error(&name, content.as_ref());
                if let Some(error) = &node.error {
                    tracing::warn!(path = %path, error = %error, "file content is not valid JSON");
                }
                if let Some(container) = node.container.take() {
                    container.storage.dispose();
                }
                node.content = content;
                Ok(node.stamp_clean())
            },
            Err(err) if err.is_soft() => {
                let message = (*err).to_string();
                tracing::warn!(path = %path, error = %message, "file failed to load");
                node.error = Some(message);
                Ok(node.stamp_clean())
            },
            Err(err) => Err(err),
        }
    }

    /// Replace the content in memory, recording the prior content in the
    /// version log.
    ///
    /// Returns `false` (and records nothing) when the new content is equal to
    /// the current content.
    pub fn set_content(&self, content: impl Into<Content>) -> Result<bool> {
        self.apply_content(content.into(), true)
    }

    /// Like [`set_content`](Self::set_content) without a version log entry.
    pub fn set_content_versionless(&self, content: impl Into<Content>) -> Result<bool> {
        self.apply_content(content.into(), false)
    }

    fn apply_content(&self, content: Content, versioned: bool) -> Result<bool> {
        self.storage.ensure_writable()?;
        let path = {
            let mut tree = self.storage.lock()?;
            let path = tree.file_path(self.id)?;
            let node = tree.file(self.id)?;
            if node.content.as_ref().is_some_and(|current| current.same_as(&content)) {
                return Ok(false);
            }
            let (prior, prior_time) = (node.content.clone(), node.modified);
            if versioned {
                let version = tree.versions.push(self.id, path.clone(), prior, prior_time);
                tree.file_mut(self.id)?.versions.push(version);
            }
            let node = tree.file_mut(self.id)?;
            node.content = Some(content);
            node.modified = Some(UtcDateTime::now());
            path
        };
        self.storage.emit(StorageEvent::FileContentsUpdated { path });
        Ok(true)
    }

    /// Write the content to the backend.
    ///
    /// A file with no content is left alone. If the content changes while the
    /// write is in flight the file stays marked as needing a save.
    #[instrument(level = "debug", skip(self), fields(storage = self.storage.name(), path = tracing::field::Empty))]
    pub async fn save_content(&self) -> Result<UtcDateTime> {
        self.storage.ensure_writable()?;
        let (path, content, modified, stamp) = {
            let tree = self.storage.lock()?;
            let node = tree.file(self.id)?;
            (tree.file_path(self.id)?, node.content.clone(), node.modified, node.last_loaded_or_saved)
        };
        tracing::Span::current().record("path", path.as_str());
        let Some(content) = content else {
            return Ok(stamp.unwrap_or_else(UtcDateTime::now));
        };
        self.storage.backend().write(&path, &content).await?;
        tracing::debug!(bytes = content.len(), "file saved");
        let mut tree = self.storage.lock()?;
        let node = tree.file_mut(self.id)?;
        if node.modified == modified {
            node.error = None;
            return Ok(node.stamp_clean());
        }
        Ok(UtcDateTime::now())
    }

    /// Delete this file from the backend and the tree.
    pub async fn delete(&self) -> Result<()> {
        let name = self.name()?;
        self.folder()?.delete_file(&name).await?;
        Ok(())
    }

    /// The package container inside this file, as its own storage.
    ///
    /// Returns `None` for files that aren't package containers. The decoded
    /// storage is cached on the file; a forced reload of the file's content
    /// drops it. A container file with no content yields an empty storage.
    pub async fn container_storage(&self) -> Result<Option<Storage>> {
        let name = self.name()?;
        if PackageKind::from_path(&name).is_none() {
            return Ok(None);
        }
        if let Some(container) = self.storage.lock()?.file(self.id)?.container.clone() {
            return Ok(Some(container.storage));
        }
        self.load_content(false).await?;
        let archive = match self.content()? {
            Some(content) => Archive::decode(content.as_bytes()).map_err(ErrorKind::archive)?,
            None => Archive::new(),
        };
        tracing::debug!(name = %name, entries = archive.len(), "opened package container");
        let backend = Arc::new(ArchiveBackend::new(name, archive));
        let storage = Storage::with_read_only(backend.clone(), self.storage.read_only());
        let mut tree = self.storage.lock()?;
        let node = tree.file_mut(self.id)?;
        match &node.container {
            Some(existing) => {
                storage.dispose();
                Ok(Some(existing.storage.clone()))
            },
            None => {
                node.container = Some(Container { storage: storage.clone(), archive: backend });
                Ok(Some(storage))
            },
        }
    }

    /// Save the opened container's tree and re-encode it into this file's
    /// content (in memory; call [`save_content`](Self::save_content) to
    /// persist). Returns `false` if no container is open or nothing changed.
    pub async fn save_container(&self) -> Result<bool> {
        let container = self.storage.lock()?.file(self.id)?.container.clone();
        let Some(container) = container else {
            return Ok(false);
        };
        container.storage.root_folder().save_all().await?;
        let bytes = container.archive.to_bytes()?;
        self.set_content(Content::Bytes(bytes))
    }

    /// Release this file. Nothing is deleted from the backend.
    pub fn dispose(&self) -> Result<()> {
        let path = self.storage.lock()?.remove_file(self.id)?;
        self.storage.emit(StorageEvent::FileRemoved { path });
        Ok(())
    }
}

/// A `.json` file whose text doesn't parse gets flagged but stays readable.
fn json_error(name: &str, content: Option<&Content>) -> Option<String> {
    if !name.to_ascii_lowercase().ends_with(".json") {
        return None;
    }
    let text = content?.as_text()?;
    serde_json::from_str::<serde::de::IgnoredAny>(text)
        .err()
        .map(|err| format!("invalid JSON: {err}"))
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.storage == other.storage && self.id == other.id
    }
}

impl Eq for File {}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("storage", &self.storage.id())
            .field("path", &self.path().unwrap_or_default())
            .finish()
    }
}
