//! Read-only backend decorator.
//!
//! Wraps another backend, passes reads through and refuses everything that
//! would change the medium. A [`Storage`](crate::Storage) over this backend
//! is read-only, so mutations fail before they ever get here; the refusals
//! below cover callers that talk to the backend directly.

use crate::backend::{Backend, BackendHandle, Listing, refuse_write};
use crate::content::{Content, Encoding};
use crate::error::Result;
use async_trait::async_trait;

/// Read-only storage backend.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}

impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Backend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn read_only(&self) -> bool {
        true
    }

    fn delimiter(&self) -> char {
        self.inner.delimiter()
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        self.inner.list(folder).await
    }

    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        self.inner.read(path, encoding).await
    }

    async fn write(&self, path: &str, _content: &Content) -> Result<()> {
        Err(refuse_write(self.name(), path))
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        Err(refuse_write(self.name(), path))
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        Err(refuse_write(self.name(), folder))
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        Err(refuse_write(self.name(), folder))
    }

    async fn save_folder(&self, folder: &str, _listing: &Listing, _force: bool) -> Result<()> {
        Err(refuse_write(self.name(), folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KvBackend, MemoryKv};
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_reads_pass_through_and_writes_refused() {
        let inner = KvBackend::new("inner", MemoryKv::default());
        inner.write("/a.json", &Content::from("{}")).await.unwrap();
        let backend = ReadOnlyBackend::new(inner.into_handle());
        assert!(backend.read_only());
        assert_eq!(backend.name(), "inner");
        assert_eq!(backend.list("/").await.unwrap().files.len(), 1);
        assert!(backend.read("/a.json", Encoding::Text).await.unwrap().is_some());

        let err = backend.write("/a.json", &Content::from("[]")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ReadOnly(_)));
        assert!(backend.delete_file("/a.json").await.is_err());
        assert!(backend.delete_folder("/").await.is_err());
        assert_eq!(backend.read("/a.json", Encoding::Text).await.unwrap(), Some(Content::from("{}")));
    }
}
