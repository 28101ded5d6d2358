use crate::diff::error::{ErrorKind as DiffErrorKind, Result as DiffResult};
use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use exn::ResultExt;
use quarry_archive::Archive;
use quarry_storage::backend::ArchiveBackend;
use quarry_storage::{Content, File, Folder, Storage};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileDifferenceType {
    None,
    /// Present on both sides with different content.
    ContentsDifferent,
    /// Only present in the updated tree.
    FileAdded,
    /// Only present in the original tree.
    FileDeleted,
}

/// What changed directly inside one folder. Combinable with `|`.
///
/// ```
/// use quarry_reconcile::FolderDifferenceType;
/// let kind = FolderDifferenceType::FILE_CONTENTS_DIFFER | FolderDifferenceType::FILE_LIST_DIFFERS;
/// assert!(kind.contains(FolderDifferenceType::FILE_LIST_DIFFERS));
/// assert!(!kind.contains(FolderDifferenceType::FOLDER_ADDED));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FolderDifferenceType(u8);

impl FolderDifferenceType {
    pub const NONE: Self = Self(0);
    pub const FILE_CONTENTS_DIFFER: Self = Self(1);
    pub const FILE_LIST_DIFFERS: Self = Self(1 << 1);
    pub const FOLDER_ADDED: Self = Self(1 << 2);
    pub const FOLDER_DELETED: Self = Self(1 << 3);
    pub const FOLDER_LIST_DIFFERS: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::FILE_CONTENTS_DIFFER, "file-contents-differ"),
        (Self::FILE_LIST_DIFFERS, "file-list-differs"),
        (Self::FOLDER_ADDED, "folder-added"),
        (Self::FOLDER_DELETED, "folder-deleted"),
        (Self::FOLDER_LIST_DIFFERS, "folder-list-differs"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FolderDifferenceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FolderDifferenceType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FolderDifferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string())
    }
}

impl fmt::Display for FolderDifferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        let names: Vec<&str> =
            Self::NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect();
        f.write_str(&names.join("|"))
    }
}

/// One file-level difference.
#[derive(Clone, Debug)]
pub struct FileDifference {
    pub kind: FileDifferenceType,
    /// Path relative to the original folder that was diffed.
    pub path: String,
    pub original: Option<File>,
    pub updated: Option<File>,
}

/// One folder-level difference.
#[derive(Clone, Debug)]
pub struct FolderDifference {
    pub kind: FolderDifferenceType,
    /// Folder path relative to the original folder that was diffed.
    pub path: String,
    pub original: Option<Folder>,
    pub updated: Option<Folder>,
}

/// The result of [`get_differences`](super::get_differences).
///
/// Differences are recorded in walk order: a folder's own record follows the
/// records of everything below it.
#[derive(Clone, Debug, Default)]
pub struct DifferenceSet {
    pub(crate) file_differences: Vec<FileDifference>,
    pub(crate) folder_differences: Vec<FolderDifference>,
}

impl DifferenceSet {
    pub fn file_differences(&self) -> &[FileDifference] {
        &self.file_differences
    }

    pub fn folder_differences(&self) -> &[FolderDifference] {
        &self.folder_differences
    }

    pub fn has_differences(&self) -> bool {
        self.file_difference_count() > 0 || !self.folder_differences.is_empty()
    }

    pub fn file_difference_count(&self) -> usize {
        self.file_differences.iter().filter(|difference| difference.kind != FileDifferenceType::None).count()
    }

    /// Added and changed files: everything a patch has to carry.
    pub fn updates_and_adds(&self) -> impl Iterator<Item = &FileDifference> {
        self.file_differences.iter().filter(|difference| {
            matches!(difference.kind, FileDifferenceType::ContentsDifferent | FileDifferenceType::FileAdded)
        })
    }

    /// The updated content of every added or changed file, keyed by path.
    ///
    /// Files whose content can't be loaded are left out and logged.
    async fn updated_contents(&self) -> DiffResult<Vec<(String, Content)>> {
        let mut contents = Vec::new();
        for difference in self.updates_and_adds() {
            let Some(file) = &difference.updated else {
                continue;
            };
            file.load_content(false).await.or_raise(|| DiffErrorKind::Storage)?;
            match file.content().or_raise(|| DiffErrorKind::Storage)? {
                Some(content) => contents.push((difference.path.clone(), content)),
                None => {
                    let error = file.error_state_message().or_raise(|| DiffErrorKind::Storage)?;
                    tracing::warn!(path = %difference.path, error = ?error, "updated file has no content; left out");
                },
            }
        }
        Ok(contents)
    }

    async fn archive(&self) -> DiffResult<Archive> {
        let mut archive = Archive::new();
        for (path, content) in self.updated_contents().await? {
            archive.insert_file(path.trim_start_matches('/'), content.into_bytes());
        }
        Ok(archive)
    }

    /// Every added or changed file's updated content in a fresh archive-backed
    /// storage. Usable as a portable patch.
    pub async fn get_zip(&self) -> Result<Storage> {
        let archive = self.archive().await.or_raise(|| ErrorKind::Archive)?;
        tracing::debug!(files = archive.len(), "packaged differences");
        Ok(Storage::new(Arc::new(ArchiveBackend::new("differences", archive))))
    }

    /// The patch as zip bytes.
    pub async fn to_zip_bytes(&self) -> Result<Vec<u8>> {
        let archive = self.archive().await.or_raise(|| ErrorKind::Archive)?;
        archive.encode().or_raise(|| DiffErrorKind::Archive).or_raise(|| ErrorKind::Archive)
    }

    /// The patch as URL-safe base64, suitable for a URL fragment.
    ///
    /// The receiving end reads it back with
    /// [`create_storage_from_untrusted_string`](quarry_storage::create_storage_from_untrusted_string).
    pub async fn to_shareable_string(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_zip_bytes().await?))
    }

    /// Write every added or changed file's updated content into `target`.
    ///
    /// Returns how many files were written. Files already holding the updated
    /// content are not rewritten.
    #[tracing::instrument(level = "debug", skip_all, fields(target = target.name()))]
    pub async fn copy_file_updates_and_adds(&self, target: &Storage) -> Result<usize> {
        self.copy_file_updates_and_adds_inner(target).await.or_raise(|| ErrorKind::Patch)
    }

    async fn copy_file_updates_and_adds_inner(&self, target: &Storage) -> DiffResult<usize> {
        let root = target.root_folder();
        let mut written = 0;
        for (path, content) in self.updated_contents().await? {
            let file = root.ensure_file_from_relative_path(&path).or_raise(|| DiffErrorKind::Storage)?;
            file.load_content(false).await.or_raise(|| DiffErrorKind::Storage)?;
            if file.set_content(content).or_raise(|| DiffErrorKind::Storage)? {
                file.save_content().await.or_raise(|| DiffErrorKind::Storage)?;
                tracing::trace!(path = %path, "patched");
                written += 1;
            }
        }
        tracing::info!(written, "applied differences");
        Ok(written)
    }
}
