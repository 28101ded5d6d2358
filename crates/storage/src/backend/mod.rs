//! Backend trait and implementations.
//!
//! A [`Backend`] is the only thing that differs between media. The generic
//! [`Storage`](crate::Storage) tree calls it to enumerate a folder, read or
//! write a file, and delete things; everything else (paths, names, caching,
//! versions, events) is shared.
//!

mod archive;
mod github;
mod handle;
mod http;
mod kv;
mod local;
mod ro;

pub use self::archive::ArchiveBackend;
pub use self::github::{ContentFetch, GitHubBackend};
pub use self::handle::{ChunkReader, ChunkWriter, DirectoryHandle, FileHandle, HandleBackend, HandleKind, MemoryDirectory};
pub use self::http::HttpBackend;
#[cfg(feature = "sled")]
pub use self::kv::SledKv;
pub use self::kv::{KeyValueStore, KvBackend, MemoryKv};
pub use self::local::{LocalBackend, Trash};
pub use self::ro::ReadOnlyBackend;
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::sync::Arc;
use time::UtcDateTime;

/// Shared handle to any backend.
pub type BackendHandle = Arc<dyn Backend>;

/// A file reported by [`Backend::list`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: Option<u64>,
    pub modified: Option<UtcDateTime>,
}

impl FileEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// A child folder reported by [`Backend::list`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub file_count: Option<u64>,
    pub modified: Option<UtcDateTime>,
}

impl FolderEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// The direct children of one folder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

/// Unified interface for storage media.
///
/// Every path handed to a backend is storage-relative: folders are
/// `/`-delimited and end with `/` (the root is `/`), files are their folder's
/// path followed by the name. Backends translate to their native form.
///
/// # Missing things
/// Listing a folder the medium doesn't have yields an empty [`Listing`];
/// reading a file it doesn't have yields `Ok(None)`; deleting something that
/// is already gone succeeds. Everything else is an error, and errors of the
/// [soft](ErrorKind::is_soft) kind are recorded on the tree rather than
/// aborting a walk.
///
/// # Examples
///
/// ```
/// use quarry_storage::backend::{Backend, KvBackend, MemoryKv};
/// use quarry_storage::content::{Content, Encoding};
/// # async fn example() -> quarry_storage::error::Result<()> {
/// let backend = KvBackend::new("scratch", MemoryKv::default());
/// backend.write("/packs/manifest.json", &Content::from("{}")).await?;
/// let listing = backend.list("/packs/").await?;
/// assert_eq!(listing.files[0].name, "manifest.json");
/// assert!(backend.read("/missing.json", Encoding::Text).await?.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the configured backend (taken from the configuration key).
    /// Used for logging only; uniqueness is not enforced.
    fn name(&self) -> &str;

    /// Whether the medium refuses writes. Storages over a read-only backend
    /// reject every mutation before it reaches the backend.
    fn read_only(&self) -> bool {
        false
    }

    /// The medium's native path delimiter.
    fn delimiter(&self) -> char {
        '/'
    }

    /// Enumerate the direct children of a folder.
    async fn list(&self, folder: &str) -> Result<Listing>;

    /// Read a file, materialised in the given encoding.
    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>>;

    /// Create or overwrite a file, creating parent folders as needed.
    async fn write(&self, path: &str, content: &Content) -> Result<()>;

    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Create a folder. Media without real folders need not do anything.
    async fn create_folder(&self, _folder: &str) -> Result<()> {
        Ok(())
    }

    /// Delete a folder and everything beneath it.
    async fn delete_folder(&self, folder: &str) -> Result<()>;

    /// Persist a folder's listing, for media that keep listings separately
    /// from content. `force` rewrites the listing even if it is unchanged.
    async fn save_folder(&self, _folder: &str, _listing: &Listing, _force: bool) -> Result<()> {
        Ok(())
    }

    /// Box the backend up as a [`BackendHandle`].
    fn into_handle(self) -> BackendHandle
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

/// Shared refusal for the mutating methods of read-only media.
pub(crate) fn refuse_write(backend: &str, path: &str) -> crate::error::Error {
    tracing::debug!(backend, path, "refusing write on read-only backend");
    exn::Exn::from(ErrorKind::ReadOnly(backend.to_string()))
}
