//! Differences between two folder trees.
//!
//! [`get_differences`] walks an *original* and an *updated* folder side by
//! side (they may live on entirely different backends) and records what it
//! would take to turn one into the other:
//!
//! - A [`FileDifference`] per file whose content differs, that only the
//!   updated side has, or (optionally) that only the original side has.
//!   JSON files that differ only in formatting are equal.
//! - A [`FolderDifference`] per folder level where anything changed, tagged
//!   with a [`FolderDifferenceType`] bitmask.
//!
//! All paths are expressed relative to the original folder, so the resulting
//! [`DifferenceSet`] can be replayed onto any copy of it
//! ([`DifferenceSet::copy_file_updates_and_adds`]) or shipped as a zip
//! ([`DifferenceSet::get_zip`], [`DifferenceSet::to_shareable_string`]).
//!
//! Nodes whose last load failed softly are skipped rather than reported.

mod compare;
pub mod error;
mod set;

pub use self::compare::{file_contents_equal, rebase_path, relative_to};
pub use self::set::{DifferenceSet, FileDifference, FileDifferenceType, FolderDifference, FolderDifferenceType};

use crate::diff::error::{ErrorKind as DiffErrorKind, Result as DiffResult};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::TryStreamExt;
use quarry_storage::{File, Folder};
use std::collections::HashSet;
use tracing::instrument;

/// Compare `original` against `updated`.
///
/// Files only present in `original` are reported when `include_deletions` is
/// set. With `match_single_child_folders`, a level where each side has
/// exactly one child folder pairs them even if their names differ (a starter
/// template folder renamed for a project, for instance). Nothing broader than
/// that single pairing is attempted.
#[instrument(
    level = "debug",
    skip(original, updated),
    fields(original = original.storage().name(), updated = updated.storage().name())
)]
pub async fn get_differences(
    original: &Folder,
    updated: &Folder,
    include_deletions: bool,
    match_single_child_folders: bool,
) -> Result<DifferenceSet> {
    let walk = Walk {
        original_root: original.path().or_raise(|| ErrorKind::Storage)?,
        updated_root: updated.path().or_raise(|| ErrorKind::Storage)?,
        include_deletions,
        match_single_child_folders,
    };
    let mut set = DifferenceSet::default();
    walk.folder(&mut set, original, updated).await.or_raise(|| ErrorKind::Diff)?;
    tracing::info!(
        files = set.file_difference_count(),
        folders = set.folder_differences().len(),
        "differences computed"
    );
    Ok(set)
}

struct Walk {
    original_root: String,
    updated_root: String,
    include_deletions: bool,
    match_single_child_folders: bool,
}

impl Walk {
    fn original_relative(&self, path: &str) -> String {
        relative_to(&self.original_root, path)
    }

    fn updated_relative(&self, path: &str) -> String {
        relative_to(&self.updated_root, path)
    }

    /// Compare one matched pair of folders, recursing into matched children.
    async fn folder(&self, set: &mut DifferenceSet, original: &Folder, updated: &Folder) -> DiffResult<FolderDifferenceType> {
        original.load(false).await.or_raise(|| DiffErrorKind::Storage)?;
        updated.load(false).await.or_raise(|| DiffErrorKind::Storage)?;
        let original_path = original.path().or_raise(|| DiffErrorKind::Storage)?;
        let relative = self.original_relative(&original_path);
        for folder in [original, updated] {
            if let Some(error) = folder.error_status().or_raise(|| DiffErrorKind::Storage)? {
                tracing::warn!(path = %relative, error = %error, "folder failed to load; not compared");
                return Ok(FolderDifferenceType::NONE);
            }
        }
        let updated_relative = self.updated_relative(&updated.path().or_raise(|| DiffErrorKind::Storage)?);

        let mut kind = FolderDifferenceType::NONE;
        let mut considered = HashSet::new();
        for file in original.files().or_raise(|| DiffErrorKind::Storage)? {
            let name = file.name().or_raise(|| DiffErrorKind::Storage)?;
            let path = format!("{relative}{name}");
            match updated.file(&name).or_raise(|| DiffErrorKind::Storage)? {
                Some(other) => {
                    considered.insert(name.clone());
                    if !self.same_content(&path, &name, &file, &other).await? {
                        kind |= FolderDifferenceType::FILE_CONTENTS_DIFFER;
                        set.file_differences.push(FileDifference {
                            kind: FileDifferenceType::ContentsDifferent,
                            path,
                            original: Some(file),
                            updated: Some(other),
                        });
                    }
                },
                None if self.include_deletions => {
                    kind |= FolderDifferenceType::FILE_LIST_DIFFERS;
                    set.file_differences.push(FileDifference {
                        kind: FileDifferenceType::FileDeleted,
                        path,
                        original: Some(file),
                        updated: None,
                    });
                },
                None => {},
            }
        }
        for file in updated.files().or_raise(|| DiffErrorKind::Storage)? {
            let name = file.name().or_raise(|| DiffErrorKind::Storage)?;
            if considered.contains(&name) {
                continue;
            }
            kind |= FolderDifferenceType::FILE_LIST_DIFFERS;
            let path = format!("{relative}{name}");
            set.file_differences.push(FileDifference { kind: FileDifferenceType::FileAdded, path, original: None, updated: Some(file) });
        }

        kind |= self.child_folders(set, original, updated, &relative, &updated_relative).await?;

        if !kind.is_none() {
            set.folder_differences.push(FolderDifference {
                kind,
                path: relative,
                original: Some(original.clone()),
                updated: Some(updated.clone()),
            });
        }
        Ok(kind)
    }

    async fn child_folders(
        &self,
        set: &mut DifferenceSet,
        original: &Folder,
        updated: &Folder,
        relative: &str,
        updated_relative: &str,
    ) -> DiffResult<FolderDifferenceType> {
        let originals = original.folders().or_raise(|| DiffErrorKind::Storage)?;
        let updates = updated.folders().or_raise(|| DiffErrorKind::Storage)?;

        if self.match_single_child_folders && let ([only_original], [only_updated]) = (originals.as_slice(), updates.as_slice()) {
            let (a, b) = (only_original.name().or_raise(|| DiffErrorKind::Storage)?, only_updated.name().or_raise(|| DiffErrorKind::Storage)?);
            if a != b {
                tracing::debug!(original = %a, updated = %b, "pairing single child folders");
                Box::pin(self.folder(set, only_original, only_updated)).await?;
                return Ok(FolderDifferenceType::NONE);
            }
        }

        let mut kind = FolderDifferenceType::NONE;
        let mut considered = HashSet::new();
        for child in &originals {
            let name = child.name().or_raise(|| DiffErrorKind::Storage)?;
            match updated.folder(&name).or_raise(|| DiffErrorKind::Storage)? {
                Some(other) => {
                    considered.insert(name);
                    Box::pin(self.folder(set, child, &other)).await?;
                },
                None if self.include_deletions => {
                    kind |= FolderDifferenceType::FOLDER_LIST_DIFFERS;
                    self.deleted_folder(set, child, &format!("{relative}{name}/")).await?;
                },
                None => {},
            }
        }
        for child in &updates {
            let name = child.name().or_raise(|| DiffErrorKind::Storage)?;
            if considered.contains(&name) {
                continue;
            }
            kind |= FolderDifferenceType::FOLDER_LIST_DIFFERS;
            self.added_folder(set, child, relative, updated_relative).await?;
        }
        Ok(kind)
    }

    /// Every file below a folder only the updated side has.
    async fn added_folder(&self, set: &mut DifferenceSet, folder: &Folder, relative: &str, updated_relative: &str) -> DiffResult<()> {
        let files: Vec<File> = folder.files_recursive().try_collect().await.or_raise(|| DiffErrorKind::Storage)?;
        for file in files {
            let path = self.updated_relative(&file.path().or_raise(|| DiffErrorKind::Storage)?);
            let path = rebase_path(&path, updated_relative, relative);
            set.file_differences.push(FileDifference { kind: FileDifferenceType::FileAdded, path, original: None, updated: Some(file) });
        }
        let path = rebase_path(&self.updated_relative(&folder.path().or_raise(|| DiffErrorKind::Storage)?), updated_relative, relative);
        set.folder_differences.push(FolderDifference {
            kind: FolderDifferenceType::FOLDER_ADDED,
            path,
            original: None,
            updated: Some(folder.clone()),
        });
        Ok(())
    }

    /// Every file below a folder only the original side has.
    async fn deleted_folder(&self, set: &mut DifferenceSet, folder: &Folder, path: &str) -> DiffResult<()> {
        let files: Vec<File> = folder.files_recursive().try_collect().await.or_raise(|| DiffErrorKind::Storage)?;
        for file in files {
            let path = self.original_relative(&file.path().or_raise(|| DiffErrorKind::Storage)?);
            set.file_differences.push(FileDifference { kind: FileDifferenceType::FileDeleted, path, original: Some(file), updated: None });
        }
        set.folder_differences.push(FolderDifference {
            kind: FolderDifferenceType::FOLDER_DELETED,
            path: path.to_string(),
            original: Some(folder.clone()),
            updated: None,
        });
        Ok(())
    }

    /// Whether a matched pair of files holds the same content.
    ///
    /// A side that could not be loaded counts as unchanged; it's logged and
    /// left for the caller to notice through the file's error state.
    async fn same_content(&self, path: &str, name: &str, original: &File, updated: &File) -> DiffResult<bool> {
        original.load_content(false).await.or_raise(|| DiffErrorKind::Storage)?;
        updated.load_content(false).await.or_raise(|| DiffErrorKind::Storage)?;
        let a = original.content().or_raise(|| DiffErrorKind::Storage)?;
        let b = updated.content().or_raise(|| DiffErrorKind::Storage)?;
        for file in [original, updated] {
            if file.is_in_error_state().or_raise(|| DiffErrorKind::Storage)? && file.content().or_raise(|| DiffErrorKind::Storage)?.is_none() {
                tracing::warn!(path = %path, storage = file.storage().name(), "file failed to load; not compared");
                return Ok(true);
            }
        }
        Ok(match (a, b) {
            (Some(a), Some(b)) => file_contents_equal(name, &a, &b),
            (None, None) => true,
            _ => false,
        })
    }
}
