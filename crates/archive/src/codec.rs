//! In-memory zip decoding and encoding.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path};
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The decoded contents of a package container.
///
/// Entry paths are `/`-delimited and relative to the archive root, with no
/// leading or trailing delimiter (`textures/blocks/stone.png`). Folders are
/// tracked separately so that empty directories survive a decode/encode
/// cycle; the parents of every file are implied and need not be listed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Archive {
    files: BTreeMap<String, Vec<u8>>,
    folders: BTreeSet<String>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode zip bytes with no limit on the expanded size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limit(bytes, u64::MAX)
    }

    /// Decode zip bytes, failing with [`TooLarge`](ErrorKind::TooLarge) once
    /// the sum of expanded entry sizes passes `max_expanded` bytes.
    ///
    /// Entry names that would escape the archive root are rejected rather
    /// than skipped; a container with such an entry is not trustworthy.
    #[instrument(skip(bytes), fields(input_size = bytes.len(), entries = tracing::field::Empty))]
    pub fn decode_with_limit(bytes: &[u8], max_expanded: u64) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::InvalidData)?;
        let mut archive = Self::new();
        let mut expanded: u64 = 0;
        for index in 0..zip.len() {
            let entry = zip.by_index(index).or_raise(|| ErrorKind::InvalidData)?;
            let raw_name = entry.name().to_string();
            let path = entry
                .enclosed_name()
                .and_then(|p| normalize(&p))
                .ok_or_raise(|| ErrorKind::UnsafeEntry(raw_name.clone()))?;
            if entry.is_dir() {
                archive.folders.insert(path);
                continue;
            }
            let remaining = max_expanded.saturating_sub(expanded);
            let mut data = Vec::new();
            // Read one byte past the budget so an oversized entry is detected
            // without trusting the size recorded in the header.
            entry.take(remaining.saturating_add(1)).read_to_end(&mut data).or_raise(|| ErrorKind::InvalidData)?;
            expanded = expanded.saturating_add(data.len() as u64);
            if expanded > max_expanded {
                exn::bail!(ErrorKind::TooLarge(max_expanded));
            }
            archive.files.insert(path, data);
        }
        tracing::Span::current().record("entries", archive.files.len());
        Ok(archive)
    }

    /// Encode into deflated zip bytes.
    #[instrument(skip(self), fields(files = self.files.len(), output_size = tracing::field::Empty))]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for folder in &self.folders {
            writer.add_directory(folder.as_str(), options).or_raise(|| ErrorKind::Io)?;
        }
        for (path, data) in &self.files {
            writer.start_file(path.as_str(), options).or_raise(|| ErrorKind::Io)?;
            writer.write_all(data).or_raise(|| ErrorKind::Io)?;
        }
        let output = writer.finish().or_raise(|| ErrorKind::Io)?.into_inner();
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }

    /// Insert (or replace) a file. Returns `false` if the path is unusable.
    pub fn insert_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> bool {
        match normalize(Path::new(path)) {
            Some(path) => {
                self.files.insert(path, data.into());
                true
            },
            None => false,
        }
    }

    pub fn insert_folder(&mut self, path: &str) -> bool {
        match normalize(Path::new(path)) {
            Some(path) => {
                self.folders.insert(path);
                true
            },
            None => false,
        }
    }

    pub fn remove_file(&mut self, path: &str) -> Option<Vec<u8>> {
        normalize(Path::new(path)).and_then(|path| self.files.remove(&path))
    }

    /// Remove a folder and everything beneath it.
    pub fn remove_folder(&mut self, path: &str) -> usize {
        let Some(path) = normalize(Path::new(path)) else {
            return 0;
        };
        let prefix = format!("{path}/");
        let before = self.files.len();
        self.files.retain(|name, _| !name.starts_with(&prefix));
        self.folders.retain(|name| name != &path && !name.starts_with(&prefix));
        before - self.files.len()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        normalize(Path::new(path)).and_then(|path| self.files.get(&path).map(Vec::as_slice))
    }

    /// Explicitly recorded folders plus every folder implied by a file path.
    pub fn folders(&self) -> BTreeSet<String> {
        let mut folders = self.folders.clone();
        for path in self.files.keys() {
            let mut current = path.as_str();
            while let Some((parent, _)) = current.rsplit_once('/') {
                folders.insert(parent.to_string());
                current = parent;
            }
        }
        folders
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Join the normal components of `path` with `/`. Returns `None` for paths
/// that are empty or that try to leave the root.
fn normalize(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir | Component::RootDir => {},
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    // Backslash-delimited names from Windows zip tools show up as a single
    // component on Unix; split them here so both platforms agree.
    let joined = parts.join("/").replace('\\', "/");
    let cleaned: Vec<&str> = joined.split('/').filter(|s| !s.is_empty()).collect();
    if cleaned.is_empty() || cleaned.contains(&"..") {
        return None;
    }
    Some(cleaned.join("/"))
}
