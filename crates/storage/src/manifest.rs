//! Deduplicating bulk copy with a `files.json` manifest.
//!
//! Copying a tree writes every distinct file once. A file whose basename,
//! size and MD5 match one already written is recorded in the manifest with a
//! `sourcePath` pointing at the copy instead of being written again;
//! [`restore`] materialises those entries later.
//!
//! ```json
//! {
//!   "path": "/packs/",
//!   "files": [
//!     { "path": "/a/pack_icon.png", "size": 1234, "hash": "9e10..." },
//!     { "path": "/b/pack_icon.png", "size": 1234, "hash": "9e10...", "sourcePath": "/a/pack_icon.png" }
//!   ]
//! }
//! ```

use crate::error::{ErrorKind, Result};
use crate::model::Folder;
use crate::path::base_name;
use futures::TryStreamExt;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

pub const MANIFEST_FILE: &str = "files.json";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Storage-relative path of the folder that was copied.
    pub path: String,
    pub files: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Path relative to the copied folder.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Where identical content was already written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl FileManifest {
    /// Read `files.json` from a folder. `None` if there isn't one.
    pub async fn read(folder: &Folder) -> Result<Option<Self>> {
        let Some(file) = folder.get_file_from_relative_path(&format!("/{MANIFEST_FILE}")).await? else {
            return Ok(None);
        };
        file.load_content(false).await?;
        let Some(content) = file.content()? else {
            return Ok(None);
        };
        let manifest = serde_json::from_slice(content.as_bytes())
            .map_err(|err| ErrorKind::InvalidData(format!("{MANIFEST_FILE}: {err}")))?;
        Ok(Some(manifest))
    }

    /// Write `files.json` into a folder and save it.
    pub async fn write(&self, folder: &Folder) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|err| ErrorKind::InvalidData(err.to_string()))?;
        let file = folder.ensure_file(MANIFEST_FILE)?;
        file.set_content_versionless(text)?;
        file.save_content().await?;
        Ok(())
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.files.iter().filter(|entry| entry.source_path.is_some())
    }
}

/// Lookup from (basename, size, MD5) to the path where that content lives.
#[derive(Clone, Debug, Default)]
pub struct PathHashTable {
    entries: HashMap<String, String>,
}

impl PathHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(path: &str, size: u64, hash: &str) -> String {
        format!("{}|{size}|{hash}", base_name(path))
    }

    pub fn lookup(&self, path: &str, size: u64, hash: &str) -> Option<&str> {
        self.entries.get(&Self::key(path, size, hash)).map(String::as_str)
    }

    /// Remember where content lives. The first location recorded wins.
    pub fn record(&mut self, path: &str, size: u64, hash: &str) {
        self.entries.entry(Self::key(path, size, hash)).or_insert_with(|| path.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Copy every file below `source` into `target`, writing duplicate content
/// only once, then save a `files.json` manifest at the top of `target`.
///
/// `table` may carry entries from earlier copies into the same target.
#[instrument(level = "debug", skip_all, fields(source = source.storage().name(), target = target.storage().name()))]
pub async fn bulk_copy(source: &Folder, target: &Folder, table: &mut PathHashTable) -> Result<FileManifest> {
    target.storage().ensure_writable()?;
    let root = source.path()?;
    let mut manifest = FileManifest { path: root.clone(), files: Vec::new() };
    let files: Vec<_> = source.files_recursive().try_collect().await?;
    for file in files {
        let absolute = file.path()?;
        let relative = format!("/{}", absolute.strip_prefix(root.as_str()).unwrap_or(&absolute).trim_start_matches('/'));
        if relative == format!("/{MANIFEST_FILE}") {
            continue;
        }
        file.load_content(false).await?;
        let Some(content) = file.content()? else {
            tracing::debug!(path = %absolute, "no content; not copied");
            continue;
        };
        let size = content.len() as u64;
        let hash = md5_hex(content.as_bytes());
        let source_path = table.lookup(&relative, size, &hash).filter(|existing| *existing != relative).map(str::to_string);
        if source_path.is_none() {
            let copy = target.ensure_file_from_relative_path(&relative)?;
            copy.set_content(content)?;
            copy.save_content().await?;
            table.record(&relative, size, &hash);
        } else {
            tracing::trace!(path = %relative, "identical content already copied");
        }
        manifest.files.push(ManifestEntry { path: relative, size: Some(size), hash: Some(hash), source_path });
    }
    manifest.write(target).await?;
    tracing::info!(
        files = manifest.files.len(),
        deduplicated = manifest.duplicates().count(),
        "bulk copy finished"
    );
    Ok(manifest)
}

/// Materialise every deduplicated entry of the `files.json` in `target`.
///
/// Returns how many files were written. A folder without a manifest has
/// nothing to restore.
#[instrument(level = "debug", skip_all, fields(target = target.storage().name()))]
pub async fn restore(target: &Folder) -> Result<usize> {
    let Some(manifest) = FileManifest::read(target).await? else {
        return Ok(0);
    };
    let mut restored = 0;
    for entry in manifest.duplicates() {
        let Some(source_path) = &entry.source_path else {
            continue;
        };
        let Some(source) = target.get_file_from_relative_path(source_path).await? else {
            tracing::warn!(path = %entry.path, source = %source_path, "manifest source is missing");
            continue;
        };
        source.load_content(false).await?;
        let Some(content) = source.content()? else {
            continue;
        };
        let file = target.ensure_file_from_relative_path(&entry.path)?;
        if file.set_content(content)? {
            file.save_content().await?;
            restored += 1;
        }
    }
    Ok(restored)
}
