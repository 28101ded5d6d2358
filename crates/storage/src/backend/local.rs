//! Local filesystem backend.
//!
//! Folders map onto directories below a configured root and files onto
//! regular files, accessed with `tokio::fs`. Enumeration hides files whose
//! extension isn't allowed and skips ignorable folders (`.git`,
//! `node_modules`, build output).

use crate::backend::{Backend, FileEntry, FolderEntry, Listing};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::name::{is_ignorable_folder, is_usable_file_name};
use crate::path::to_native;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};

/// Fewer path delimiters than this in an absolute path is too close to a
/// filesystem root to delete anything from.
const MIN_DELETE_DEPTH: usize = 3;
const PROTECTED_FRAGMENTS: &[&str] = &["system32", "program files", "programdata"];

/// Where deletions go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trash {
    /// Nothing is removed from disk; the node only leaves the tree. Physical
    /// removal is left to an explicit, separate step.
    #[default]
    Noop,
    /// Remove files and directories from disk.
    Delete,
}

enum WalkEntry {
    File(FileEntry),
    Folder(FolderEntry),
    Skip,
}

/// Local filesystem backend.
///
/// # Examples
///
/// ```no_run
/// use quarry_storage::backend::{LocalBackend, Trash};
///
/// # fn example() -> quarry_storage::error::Result<()> {
/// let backend = LocalBackend::new("packs", "/home/me/projects/packs")?.with_trash(Trash::Delete);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the tree
    root: PathBuf,
    trash: Trash,
}

impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root.display().to_string()));
            }
        } else {
            // Use non-async here; it'll only happen once on initialization
            // and it's not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| ErrorKind::io(&e, root.display()))?;
        }
        Ok(Self { name: name.into(), root, trash: Trash::default() })
    }

    pub fn with_trash(mut self, trash: Trash) -> Self {
        self.trash = trash;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn native(&self, path: &str) -> Result<PathBuf> {
        to_native(&self.root, path)
    }

    /// Refuse paths shallow enough (or system-looking enough) that deleting
    /// them would be a disaster.
    fn guard(native: &Path) -> Result<()> {
        let text = native.to_string_lossy();
        let depth = text.chars().filter(|c| *c == '/' || *c == '\\').count();
        let lower = text.to_lowercase();
        if depth < MIN_DELETE_DEPTH || PROTECTED_FRAGMENTS.iter().any(|fragment| lower.contains(fragment)) {
            exn::bail!(ErrorKind::DangerousPath(text.into_owned()));
        }
        Ok(())
    }

    async fn process_entry(entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::io(&e, path.display()))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            // Non-UTF-8 names can't be addressed by a storage-relative path.
            return Ok(WalkEntry::Skip);
        };
        let modified = metadata.modified().ok().map(UtcDateTime::from);
        if metadata.is_dir() {
            if is_ignorable_folder(&name) {
                tracing::trace!(path = %path.display(), "skipping ignorable folder");
                return Ok(WalkEntry::Skip);
            }
            return Ok(WalkEntry::Folder(FolderEntry { name, file_count: None, modified }));
        }
        if metadata.is_file() && is_usable_file_name(&name) {
            return Ok(WalkEntry::File(FileEntry { name, size: Some(metadata.len()), modified }));
        }
        // Note: silently drop disallowed files and what are most likely broken symlinks.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn delimiter(&self) -> char {
        std::path::MAIN_SEPARATOR
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        let native = self.native(folder)?;
        let mut entries = match fs::read_dir(&native).await {
            Ok(entries) => entries,
            // Asking for a directory that doesn't exist yet is an empty folder.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Listing::default()),
            Err(err) => exn::bail!(ErrorKind::io(&err, native.display())),
        };
        let mut listing = Listing::default();
        while let Some(entry) = entries.next_entry().await.map_err(|e| ErrorKind::io(&e, native.display()))? {
            match Self::process_entry(entry).await? {
                WalkEntry::File(file) => listing.files.push(file),
                WalkEntry::Folder(folder) => listing.folders.push(folder),
                WalkEntry::Skip => {},
            }
        }
        Ok(listing)
    }

    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        let native = self.native(path)?;
        match fs::read(&native).await {
            Ok(bytes) => Ok(Some(Content::decode(bytes, encoding)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => exn::bail!(ErrorKind::io(&err, path)),
        }
    }

    async fn write(&self, path: &str, content: &Content) -> Result<()> {
        let native = self.native(path)?;
        if let Some(parent) = native.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(&e, path))?;
        }
        fs::write(&native, content.as_bytes()).await.map_err(|e| ErrorKind::io(&e, path))?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let native = self.native(path)?;
        Self::guard(&native)?;
        match self.trash {
            Trash::Noop => {
                tracing::info!(path = %native.display(), "file left on disk (trash is a no-op)");
                Ok(())
            },
            Trash::Delete => match fs::remove_file(&native).await {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::io(&err, path)),
                _ => Ok(()),
            },
        }
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        let native = self.native(folder)?;
        fs::create_dir_all(&native).await.map_err(|e| ErrorKind::io(&e, folder))?;
        Ok(())
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        let native = self.native(folder)?;
        Self::guard(&native)?;
        match self.trash {
            Trash::Noop => {
                tracing::info!(path = %native.display(), "folder left on disk (trash is a no-op)");
                Ok(())
            },
            Trash::Delete => match fs::remove_dir_all(&native).await {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::io(&err, folder)),
                _ => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::new("local", dir.path()).unwrap().with_trash(Trash::Delete)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[rstest]
    #[case("/")]
    #[case("/home")]
    #[case("/home/me")]
    #[case("C:\\Windows\\System32\\drivers\\etc")]
    #[case("/mnt/c/Program Files/Something/x")]
    #[case("/mnt/c/ProgramData/Something/x")]
    fn test_guard_rejects(#[case] path: &str) {
        let err = LocalBackend::guard(Path::new(path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::DangerousPath(_)));
    }

    #[test]
    fn test_guard_allows_deep_paths() {
        assert!(LocalBackend::guard(Path::new("/home/me/projects/pack")).is_ok());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        backend.write("/a/b/test.txt", &Content::from("Hello, world!")).await.unwrap();
        let content = backend.read("/a/b/test.txt", Encoding::Text).await.unwrap();
        assert_eq!(content, Some(Content::from("Hello, world!")));
        assert!(backend.read("/a/missing.txt", Encoding::Text).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        backend.write("/manifest.json", &Content::from("{}")).await.unwrap();
        backend.write("/tool.exe", &Content::from("MZ")).await.unwrap();
        backend.write("/.git/HEAD.txt", &Content::from("ref")).await.unwrap();
        backend.write("/node_modules/x/index.js", &Content::from("")).await.unwrap();
        backend.write("/.github/workflows/ci.yml", &Content::from("")).await.unwrap();
        backend.write("/textures/stone.png", &Content::Bytes(vec![1, 2])).await.unwrap();
        let listing = backend.list("/").await.unwrap();
        let files: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        let mut folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        folders.sort();
        assert_eq!(files, vec!["manifest.json"]);
        assert_eq!(folders, vec![".github", "textures"]);
        assert_eq!(listing.files[0].size, Some(2));
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        assert_eq!(backend.list("/nope/").await.unwrap(), Listing::default());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        backend.write("/pack/a.json", &Content::from("{}")).await.unwrap();
        backend.write("/pack/sub/b.json", &Content::from("{}")).await.unwrap();
        backend.delete_file("/pack/a.json").await.unwrap();
        assert!(!temp_dir.path().join("pack/a.json").exists());
        // Already gone is fine.
        backend.delete_file("/pack/a.json").await.unwrap();
        backend.delete_folder("/pack/").await.unwrap();
        assert!(!temp_dir.path().join("pack").exists());
    }

    #[tokio::test]
    async fn test_noop_trash_keeps_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        backend.write("/pack/a.json", &Content::from("{}")).await.unwrap();
        backend.delete_file("/pack/a.json").await.unwrap();
        assert!(temp_dir.path().join("pack/a.json").exists());
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        assert!(backend.read("/../etc/passwd", Encoding::Text).await.is_err());
        assert!(backend.write("/a/../../passwd", &Content::from("x")).await.is_err());
        assert!(backend.delete_file("/../../file").await.is_err());
    }
}
