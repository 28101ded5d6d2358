//! Backend over host-provided directory and file handles.
//!
//! Some hosts (browser file-system access, sandboxed app containers) don't
//! expose paths at all; they hand out a directory handle that can be asked
//! for child handles, and file handles that open chunked readers and
//! writers. [`HandleBackend`] walks such handles by storage-relative path.
//! Write handles are opened lazily on the first write to a path and kept
//! for later writes; reads always go through a fresh read handle and
//! concatenate the chunks into one buffer.

use crate::backend::{Backend, FileEntry, FolderEntry, Listing};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::name::{is_ignorable_folder, is_usable_file_name};
use crate::path::{segments, split_file_path};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Default chunk size of [`MemoryDirectory`] readers.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    File,
    Directory,
}

/// A handle to a directory.
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    /// Names and kinds of the direct children.
    async fn entries(&self) -> Result<Vec<(String, HandleKind)>>;

    /// Child directory; `create` makes it if absent, otherwise absent is `None`.
    async fn directory(&self, name: &str, create: bool) -> Result<Option<Arc<dyn DirectoryHandle>>>;

    /// Child file; `create` makes it (empty) if absent, otherwise absent is `None`.
    async fn file(&self, name: &str, create: bool) -> Result<Option<Arc<dyn FileHandle>>>;

    /// Remove a child of either kind. Absent children are not an error.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// A handle to a single file.
#[async_trait]
pub trait FileHandle: Send + Sync {
    async fn reader(&self) -> Result<Box<dyn ChunkReader>>;
    async fn writer(&self) -> Result<Box<dyn ChunkWriter>>;
}

#[async_trait]
pub trait ChunkReader: Send {
    /// The next chunk, or `None` once the file is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// A write stream. Nothing is visible through the file handle until
/// [`close`](Self::close) succeeds.
#[async_trait]
pub trait ChunkWriter: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

pub struct HandleBackend {
    name: String,
    root: Arc<dyn DirectoryHandle>,
    write_handles: Mutex<HashMap<String, Arc<dyn FileHandle>>>,
}

impl HandleBackend {
    pub fn new(name: impl Into<String>, root: Arc<dyn DirectoryHandle>) -> Self {
        Self { name: name.into(), root, write_handles: Mutex::new(HashMap::new()) }
    }

    async fn directory(&self, folder: &str, create: bool) -> Result<Option<Arc<dyn DirectoryHandle>>> {
        let mut current = self.root.clone();
        for segment in segments(folder)? {
            match current.directory(segment, create).await? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    async fn write_handle(&self, path: &str) -> Result<Arc<dyn FileHandle>> {
        if let Some(handle) = self.write_handles.lock().get(path).cloned() {
            return Ok(handle);
        }
        let (folder, name) = split_file_path(path)?;
        let Some(directory) = self.directory(&folder, true).await? else {
            exn::bail!(ErrorKind::Backend(format!("host refused to create {folder}")));
        };
        let Some(handle) = directory.file(name, true).await? else {
            exn::bail!(ErrorKind::Backend(format!("host refused to create {path}")));
        };
        tracing::trace!(path, "opened write handle");
        self.write_handles.lock().insert(path.to_string(), handle.clone());
        Ok(handle)
    }

    fn forget(&self, prefix: &str) {
        self.write_handles.lock().retain(|path, _| !path.starts_with(prefix));
    }
}

#[async_trait]
impl Backend for HandleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        let Some(directory) = self.directory(folder, false).await? else {
            return Ok(Listing::default());
        };
        let mut listing = Listing::default();
        for (name, kind) in directory.entries().await? {
            match kind {
                HandleKind::Directory if !is_ignorable_folder(&name) => listing.folders.push(FolderEntry::named(name)),
                HandleKind::File if is_usable_file_name(&name) => listing.files.push(FileEntry::named(name)),
                _ => {},
            }
        }
        Ok(listing)
    }

    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        let (folder, name) = split_file_path(path)?;
        let Some(directory) = self.directory(&folder, false).await? else {
            return Ok(None);
        };
        let Some(file) = directory.file(name, false).await? else {
            return Ok(None);
        };
        let mut reader = file.reader().await?;
        let mut buffer = Vec::new();
        while let Some(chunk) = reader.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(Some(Content::decode(buffer, encoding)?))
    }

    async fn write(&self, path: &str, content: &Content) -> Result<()> {
        let handle = self.write_handle(path).await?;
        let mut writer = handle.writer().await?;
        writer.write_chunk(content.as_bytes()).await?;
        writer.close().await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.forget(path);
        let (folder, name) = split_file_path(path)?;
        if let Some(directory) = self.directory(&folder, false).await? {
            directory.remove(name).await?;
        }
        Ok(())
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        self.directory(folder, true).await?;
        Ok(())
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        let mut parts = segments(folder)?;
        let Some(name) = parts.pop() else {
            exn::bail!(ErrorKind::InvalidPath(folder.to_string()));
        };
        self.forget(folder);
        if let Some(parent) = self.directory(&crate::path::folder_path(&parts), false).await? {
            parent.remove(name).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryNode {
    directories: BTreeMap<String, Arc<MemoryDirectory>>,
    files: BTreeMap<String, Arc<MemoryFile>>,
}

/// In-process directory handle host, handing out fixed-size chunks.
pub struct MemoryDirectory {
    node: Mutex<MemoryNode>,
    chunk_size: usize,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

impl MemoryDirectory {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { node: Mutex::default(), chunk_size: chunk_size.max(1) }
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    async fn entries(&self) -> Result<Vec<(String, HandleKind)>> {
        let node = self.node.lock();
        let directories = node.directories.keys().map(|name| (name.clone(), HandleKind::Directory));
        let files = node.files.keys().map(|name| (name.clone(), HandleKind::File));
        Ok(directories.chain(files).collect())
    }

    async fn directory(&self, name: &str, create: bool) -> Result<Option<Arc<dyn DirectoryHandle>>> {
        let mut node = self.node.lock();
        if let Some(directory) = node.directories.get(name) {
            return Ok(Some(directory.clone() as Arc<dyn DirectoryHandle>));
        }
        if !create {
            return Ok(None);
        }
        if node.files.contains_key(name) {
            exn::bail!(ErrorKind::Backend(format!("{name} is a file")));
        }
        let directory = Arc::new(Self::with_chunk_size(self.chunk_size));
        node.directories.insert(name.to_string(), directory.clone());
        Ok(Some(directory as Arc<dyn DirectoryHandle>))
    }

    async fn file(&self, name: &str, create: bool) -> Result<Option<Arc<dyn FileHandle>>> {
        let mut node = self.node.lock();
        if let Some(file) = node.files.get(name) {
            return Ok(Some(file.clone() as Arc<dyn FileHandle>));
        }
        if !create {
            return Ok(None);
        }
        if node.directories.contains_key(name) {
            exn::bail!(ErrorKind::Backend(format!("{name} is a directory")));
        }
        let file = Arc::new(MemoryFile { data: Arc::default(), chunk_size: self.chunk_size });
        node.files.insert(name.to_string(), file.clone());
        Ok(Some(file as Arc<dyn FileHandle>))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut node = self.node.lock();
        node.files.remove(name);
        node.directories.remove(name);
        Ok(())
    }
}

struct MemoryFile {
    data: Arc<Mutex<Arc<Vec<u8>>>>,
    chunk_size: usize,
}

#[async_trait]
impl FileHandle for MemoryFile {
    async fn reader(&self) -> Result<Box<dyn ChunkReader>> {
        Ok(Box::new(MemoryReader { data: self.data.lock().clone(), offset: 0, chunk_size: self.chunk_size }))
    }

    async fn writer(&self) -> Result<Box<dyn ChunkWriter>> {
        Ok(Box::new(MemoryWriter { target: self.data.clone(), buffer: Vec::new() }))
    }
}

struct MemoryReader {
    data: Arc<Vec<u8>>,
    offset: usize,
    chunk_size: usize,
}

#[async_trait]
impl ChunkReader for MemoryReader {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }
}

struct MemoryWriter {
    target: Arc<Mutex<Arc<Vec<u8>>>>,
    buffer: Vec<u8>,
}

#[async_trait]
impl ChunkWriter for MemoryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { target, buffer } = *self;
        *target.lock() = Arc::new(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(chunk_size: usize) -> HandleBackend {
        HandleBackend::new("handles", Arc::new(MemoryDirectory::with_chunk_size(chunk_size)))
    }

    #[tokio::test]
    async fn test_write_then_read_across_chunks() {
        let backend = backend(3);
        let bytes: Vec<u8> = (0..=20).collect();
        backend.write("/a/b/data.png", &Content::Bytes(bytes.clone())).await.unwrap();
        let read = backend.read("/a/b/data.png", Encoding::Binary).await.unwrap();
        assert_eq!(read, Some(Content::Bytes(bytes)));
        assert!(backend.read("/a/b/none.png", Encoding::Binary).await.unwrap().is_none());
        assert!(backend.read("/x/none.png", Encoding::Binary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_handle_is_reused() {
        let backend = backend(DEFAULT_CHUNK_SIZE);
        backend.write("/manifest.json", &Content::from("{}")).await.unwrap();
        backend.write("/manifest.json", &Content::from("[]")).await.unwrap();
        assert_eq!(backend.write_handles.lock().len(), 1);
        let read = backend.read("/manifest.json", Encoding::Text).await.unwrap();
        assert_eq!(read, Some(Content::from("[]")));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let backend = backend(DEFAULT_CHUNK_SIZE);
        backend.write("/pack/manifest.json", &Content::from("{}")).await.unwrap();
        backend.write("/pack/setup.exe", &Content::from("MZ")).await.unwrap();
        backend.create_folder("/pack/textures/").await.unwrap();
        backend.create_folder("/pack/.git/").await.unwrap();

        let listing = backend.list("/pack/").await.unwrap();
        assert_eq!(listing.files, vec![FileEntry::named("manifest.json")]);
        assert_eq!(listing.folders, vec![FolderEntry::named("textures")]);

        backend.delete_file("/pack/manifest.json").await.unwrap();
        assert!(backend.write_handles.lock().is_empty());
        backend.delete_folder("/pack/").await.unwrap();
        assert_eq!(backend.list("/pack/").await.unwrap(), Listing::default());
        assert!(backend.delete_folder("/").await.is_err());
    }
}
