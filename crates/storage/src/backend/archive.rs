//! Package container backend.
//!
//! Presents a decoded [`Archive`] as a backend so that the contents of a
//! `.mcpack` (or any other zip container) can be walked and edited with the
//! same [`Storage`](crate::Storage) API as a directory on disk. The archive
//! lives in memory; [`ArchiveBackend::to_bytes`] re-encodes it.

use crate::backend::{Backend, FileEntry, FolderEntry, Listing};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_archive::Archive;

pub struct ArchiveBackend {
    name: String,
    archive: Mutex<Archive>,
}

impl ArchiveBackend {
    pub fn new(name: impl Into<String>, archive: Archive) -> Self {
        Self { name: name.into(), archive: Mutex::new(archive) }
    }

    /// Encode the current contents as zip bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.archive.lock().encode().map_err(ErrorKind::archive)
    }

    /// A copy of the archive as it stands.
    pub fn snapshot(&self) -> Archive {
        self.archive.lock().clone()
    }
}

/// Storage-relative (`/a/b/`) to archive-relative (`a/b`).
fn entry_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Direct child of `parent` (archive-relative, possibly empty), if `path` is one.
fn child_of<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
    let rest = if parent.is_empty() {
        path
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

#[async_trait]
impl Backend for ArchiveBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        let parent = entry_path(folder);
        let archive = self.archive.lock();
        let files = archive
            .files()
            .filter_map(|(path, data)| {
                child_of(parent, path).map(|name| FileEntry { size: Some(data.len() as u64), ..FileEntry::named(name) })
            })
            .collect();
        let folders = archive
            .folders()
            .iter()
            .filter_map(|path| child_of(parent, path).map(FolderEntry::named))
            .collect();
        Ok(Listing { files, folders })
    }

    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        let bytes = self.archive.lock().get(entry_path(path)).map(<[u8]>::to_vec);
        bytes.map(|bytes| Content::decode(bytes, encoding)).transpose()
    }

    async fn write(&self, path: &str, content: &Content) -> Result<()> {
        if !self.archive.lock().insert_file(entry_path(path), content.as_bytes()) {
            exn::bail!(ErrorKind::InvalidPath(path.to_string()));
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.archive.lock().remove_file(entry_path(path));
        Ok(())
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        let path = entry_path(folder);
        if !path.is_empty() {
            self.archive.lock().insert_folder(path);
        }
        Ok(())
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        let removed = self.archive.lock().remove_folder(entry_path(folder));
        tracing::trace!(folder, removed, "removed folder from archive");
        Ok(())
    }
}
