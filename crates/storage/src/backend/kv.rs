//! Embedded key-value backend.
//!
//! Every folder is a small JSON listing record stored under its path (with a
//! trailing delimiter), and every file's content is stored verbatim under its
//! own path. With the default `quarry:` namespace the layout looks like:
//!
//! | Key | Value |
//! |-----|-------|
//! | `quarry:/` | `{"updated":…,"files":[…],"folders":[{"name":"packs",…}]}` |
//! | `quarry:/packs/` | `{"updated":…,"files":[{"name":"manifest.json","size":2,"modified":…}],"folders":[]}` |
//! | `quarry:/packs/manifest.json` | `{}` |
//!
//! Listing records are only rewritten when their file or folder entries
//! change, or when a save is forced.

use crate::backend::{Backend, FileEntry, FolderEntry, Listing};
use crate::content::{Content, Encoding};
use crate::error::{ErrorKind, Result};
use crate::path;
use async_trait::async_trait;
use exn::ResultExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::UtcDateTime;

const DEFAULT_NAMESPACE: &str = "quarry:";

/// Minimal async key-value contract the backend is written against.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKv {
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// On-disk store backed by [`sled`].
#[cfg(feature = "sled")]
#[derive(Clone)]
pub struct SledKv {
    db: sled::Db,
}

#[cfg(feature = "sled")]
impl SledKv {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).or_raise(|| ErrorKind::Io(format!("cannot open sled database at {}", path.display())))?;
        Ok(Self { db })
    }

    /// A throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .or_raise(|| ErrorKind::Io("cannot open temporary sled database".into()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled")]
#[async_trait]
impl KeyValueStore for SledKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.db.get(key).or_raise(|| ErrorKind::Io(format!("sled get {key}")))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db.insert(key, value).or_raise(|| ErrorKind::Io(format!("sled insert {key}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key).or_raise(|| ErrorKind::Io(format!("sled remove {key}")))?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.db.scan_prefix(prefix) {
            let (key, _) = entry.or_raise(|| ErrorKind::Io(format!("sled scan {prefix}")))?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderRecord {
    #[serde(default)]
    updated: Option<i64>,
    #[serde(default)]
    files: Vec<FileRecord>,
    #[serde(default)]
    folders: Vec<ChildRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildRecord {
    name: String,
    #[serde(default)]
    file_count: Option<u64>,
    #[serde(default)]
    modified: Option<i64>,
}

impl FolderRecord {
    /// Entries only; `updated` changes on every write and doesn't count.
    fn same_entries(&self, other: &FolderRecord) -> bool {
        self.files == other.files && self.folders == other.folders
    }

    fn upsert_file(&mut self, record: FileRecord) {
        match self.files.iter_mut().find(|file| file.name == record.name) {
            Some(existing) => *existing = record,
            None => self.files.push(record),
        }
    }

    fn ensure_folder(&mut self, name: &str) {
        if self.folders.iter().any(|folder| folder.name == name) {
            return;
        }
        self.folders.push(ChildRecord {
            name: name.to_string(),
            file_count: Some(0),
            modified: Some(millis(UtcDateTime::now())),
        });
    }
}

fn millis(at: UtcDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: Option<i64>) -> Option<UtcDateTime> {
    ms.and_then(|ms| UtcDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
}

/// Backend over any [`KeyValueStore`].
pub struct KvBackend<S: KeyValueStore> {
    name: String,
    namespace: String,
    store: S,
}

impl<S: KeyValueStore> KvBackend<S> {
    pub fn new(name: impl Into<String>, store: S) -> Self {
        Self::with_namespace(name, DEFAULT_NAMESPACE, store)
    }

    /// Prefix every key with `namespace`, so several trees can share a store.
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>, store: S) -> Self {
        Self { name: name.into(), namespace: namespace.into(), store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn key(&self, path: &str) -> String {
        format!("{}{}", self.namespace, path)
    }

    async fn record(&self, folder: &str) -> Result<Option<FolderRecord>> {
        let Some(raw) = self.store.get(&self.key(folder)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw)
            .or_raise(|| ErrorKind::InvalidData(format!("corrupt listing record for {folder}")))?;
        Ok(Some(record))
    }

    /// Write a listing record unless its entries are unchanged.
    async fn put_record(
        &self,
        folder: &str,
        mut record: FolderRecord,
        previous: Option<&FolderRecord>,
        force: bool,
    ) -> Result<bool> {
        if !force && previous.is_some_and(|previous| previous.same_entries(&record)) {
            return Ok(false);
        }
        record.updated = Some(millis(UtcDateTime::now()));
        let raw =
            serde_json::to_vec(&record).or_raise(|| ErrorKind::Backend("cannot serialise listing record".into()))?;
        self.store.set(&self.key(folder), raw).await?;
        tracing::trace!(backend = %self.name, folder, "listing record written");
        Ok(true)
    }

    /// Make sure every folder from the root down to `folder` has a record
    /// and is listed in its parent's record.
    async fn ensure_ancestors(&self, folder: &str) -> Result<()> {
        let segments = path::segments(folder)?;
        for depth in 0..=segments.len() {
            let current = path::folder_path(&segments[..depth]);
            let previous = self.record(&current).await?;
            let mut record = previous.clone().unwrap_or_default();
            if let Some(child) = segments.get(depth) {
                record.ensure_folder(child);
            }
            if previous.is_none() || previous.as_ref() != Some(&record) {
                self.put_record(&current, record, previous.as_ref(), previous.is_none()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: KeyValueStore> Backend for KvBackend<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, folder: &str) -> Result<Listing> {
        let Some(record) = self.record(folder).await? else {
            return Ok(Listing::default());
        };
        Ok(Listing {
            files: record
                .files
                .into_iter()
                .map(|file| FileEntry { name: file.name, size: file.size, modified: from_millis(file.modified) })
                .collect(),
            folders: record
                .folders
                .into_iter()
                .map(|folder| FolderEntry {
                    name: folder.name,
                    file_count: folder.file_count,
                    modified: from_millis(folder.modified),
                })
                .collect(),
        })
    }

    async fn read(&self, path: &str, encoding: Encoding) -> Result<Option<Content>> {
        match self.store.get(&self.key(path)).await? {
            Some(raw) => Ok(Some(Content::decode(raw, encoding)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, path: &str, content: &Content) -> Result<()> {
        let (folder, name) = path::split_file_path(path)?;
        self.store.set(&self.key(path), content.as_bytes().to_vec()).await?;
        self.ensure_ancestors(&folder).await?;
        let previous = self.record(&folder).await?;
        let mut record = previous.clone().unwrap_or_default();
        record.upsert_file(FileRecord {
            name: name.to_string(),
            size: Some(content.len() as u64),
            modified: Some(millis(UtcDateTime::now())),
        });
        self.put_record(&folder, record, previous.as_ref(), false).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let (folder, name) = path::split_file_path(path)?;
        self.store.remove(&self.key(path)).await?;
        if let Some(previous) = self.record(&folder).await? {
            let mut record = previous.clone();
            record.files.retain(|file| file.name != name);
            self.put_record(&folder, record, Some(&previous), false).await?;
        }
        Ok(())
    }

    async fn create_folder(&self, folder: &str) -> Result<()> {
        self.ensure_ancestors(folder).await
    }

    async fn delete_folder(&self, folder: &str) -> Result<()> {
        for key in self.store.keys_with_prefix(&self.key(folder)).await? {
            self.store.remove(&key).await?;
        }
        let segments = path::segments(folder)?;
        if let Some((name, parents)) = segments.split_last() {
            let parent = path::folder_path(parents);
            if let Some(previous) = self.record(&parent).await? {
                let mut record = previous.clone();
                record.folders.retain(|child| child.name != *name);
                self.put_record(&parent, record, Some(&previous), false).await?;
            }
        }
        tracing::debug!(backend = %self.name, folder, "folder removed from store");
        Ok(())
    }

    /// Without `force` the in-memory listing is merged into the stored
    /// record, so entries for children that were never loaded survive. With
    /// `force` the record is replaced outright.
    async fn save_folder(&self, folder: &str, listing: &Listing, force: bool) -> Result<()> {
        let previous = self.record(folder).await?;
        let mut record = match (force, &previous) {
            (false, Some(previous)) => previous.clone(),
            _ => FolderRecord::default(),
        };
        for file in &listing.files {
            record.upsert_file(FileRecord { name: file.name.clone(), size: file.size, modified: file.modified.map(millis) });
        }
        for child in &listing.folders {
            let entry = ChildRecord { name: child.name.clone(), file_count: child.file_count, modified: child.modified.map(millis) };
            match record.folders.iter_mut().find(|existing| existing.name == entry.name) {
                Some(existing) => *existing = entry,
                None => record.folders.push(entry),
            }
        }
        self.put_record(folder, record, previous.as_ref(), force).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> KvBackend<MemoryKv> {
        KvBackend::new("kv", MemoryKv::default())
    }

    #[tokio::test]
    async fn test_write_lists_file_and_ancestors() {
        let backend = backend();
        backend.write("/a/b/c.json", &Content::from("{}")).await.unwrap();
        let root = backend.list("/").await.unwrap();
        assert_eq!(root.folders.len(), 1);
        assert_eq!(root.folders[0].name, "a");
        let a = backend.list("/a/").await.unwrap();
        assert_eq!(a.folders[0].name, "b");
        let b = backend.list("/a/b/").await.unwrap();
        assert_eq!(b.files.len(), 1);
        assert_eq!(b.files[0].name, "c.json");
        assert_eq!(b.files[0].size, Some(2));
    }

    #[tokio::test]
    async fn test_key_layout() {
        let backend = backend();
        backend.write("/packs/manifest.json", &Content::from("{}")).await.unwrap();
        let store = backend.store();
        assert_eq!(store.get("quarry:/packs/manifest.json").await.unwrap().unwrap(), b"{}");
        let raw = store.get("quarry:/packs/").await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(record["updated"].is_i64());
        assert_eq!(record["files"][0]["name"], "manifest.json");
        let raw = store.get("quarry:/").await.unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record["folders"][0]["name"], "packs");
        assert!(record["folders"][0].get("fileCount").is_some());
    }

    #[tokio::test]
    async fn test_read_missing_and_binary() {
        let backend = backend();
        assert!(backend.read("/nope.png", Encoding::Binary).await.unwrap().is_none());
        backend.write("/icon.png", &Content::Bytes(vec![0, 159, 146, 150])).await.unwrap();
        let content = backend.read("/icon.png", Encoding::Binary).await.unwrap().unwrap();
        assert_eq!(content, Content::Bytes(vec![0, 159, 146, 150]));
    }

    #[tokio::test]
    async fn test_listing_only_rewritten_on_change() {
        let backend = backend();
        let listing = Listing { files: vec![FileEntry::named("x.txt")], folders: vec![] };
        backend.save_folder("/", &listing, false).await.unwrap();
        let first = backend.store().get("quarry:/").await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        backend.save_folder("/", &listing, false).await.unwrap();
        assert_eq!(backend.store().get("quarry:/").await.unwrap().unwrap(), first);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        backend.save_folder("/", &listing, true).await.unwrap();
        assert_ne!(backend.store().get("quarry:/").await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn test_delete_folder_removes_subtree() {
        let backend = backend();
        backend.write("/a/b/c.json", &Content::from("{}")).await.unwrap();
        backend.write("/a/d.txt", &Content::from("d")).await.unwrap();
        backend.write("/keep.txt", &Content::from("k")).await.unwrap();
        backend.delete_folder("/a/").await.unwrap();
        assert!(backend.read("/a/b/c.json", Encoding::Text).await.unwrap().is_none());
        assert!(backend.list("/a/").await.unwrap().files.is_empty());
        let root = backend.list("/").await.unwrap();
        assert!(root.folders.is_empty());
        assert_eq!(root.files.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_soft() {
        let backend = backend();
        backend.store().set("quarry:/", b"not json".to_vec()).await.unwrap();
        let err = backend.list("/").await.unwrap_err();
        assert!(err.is_soft());
    }

    #[cfg(feature = "sled")]
    #[tokio::test]
    async fn test_sled_store() {
        let backend = KvBackend::new("sled", SledKv::temporary().unwrap());
        backend.write("/a/x.txt", &Content::from("x")).await.unwrap();
        assert_eq!(backend.read("/a/x.txt", Encoding::Text).await.unwrap(), Some(Content::from("x")));
        backend.delete_folder("/a/").await.unwrap();
        assert!(backend.read("/a/x.txt", Encoding::Text).await.unwrap().is_none());
    }
}
