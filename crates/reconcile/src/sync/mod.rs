//! One-way folder synchronisation.
//!
//! [`sync_folder_to`] copies a source folder's files onto a target folder,
//! writing only what is missing or different, and optionally removes target
//! files the source doesn't have. The walk is depth first and strictly
//! sequential, so its duration grows with the file count times the latency
//! of each read and write.

pub mod error;
mod filter;

pub use self::filter::matches_list;

use crate::error::{ErrorKind, Result};
use crate::sync::error::{ErrorKind as SyncErrorKind, Result as SyncResult};
use exn::ResultExt;
use futures::TryStreamExt;
use quarry_storage::{File, Folder, canonicalize_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;

/// Receives short human-readable progress messages. Best effort only.
pub type MessageUpdater = dyn Fn(&str) + Send + Sync;

/// How [`sync_folder_to`] treats the two trees.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Create every visited folder on the target backend, even empty ones.
    pub force_folders: bool,
    /// Rewrite target files even when their content already matches.
    pub force_file_updates: bool,
    /// Delete target files (and folders) the source doesn't have.
    pub remove_on_target: bool,
    /// File and folder names to leave alone, see [`matches_list`].
    pub exclude: Vec<String>,
    /// When not empty, only file names matching one of these are copied.
    pub include: Vec<String>,
    /// Never touch a target file that already exists.
    pub dont_overwrite_existing_files: bool,
    /// Skip files directly inside the source folder; only subfolders are synced.
    pub skip_files_at_root: bool,
}

impl SyncOptions {
    fn wants_file(&self, name: &str) -> bool {
        !matches_list(name, &self.exclude) && (self.include.is_empty() || matches_list(name, &self.include))
    }

    fn wants_folder(&self, name: &str) -> bool {
        !matches_list(name, &self.exclude)
    }
}

/// Synchronise `source` onto `target`, returning how many target files were
/// written or deleted.
///
/// Running it twice without changing `source` (and without
/// `force_file_updates`) returns zero the second time. Files that fail to
/// load on the source are skipped and logged.
#[instrument(
    level = "debug",
    skip(source, target, message_updater),
    fields(source = source.storage().name(), target = target.storage().name())
)]
pub async fn sync_folder_to(
    source: &Folder,
    target: &Folder,
    options: &SyncOptions,
    message_updater: Option<&MessageUpdater>,
) -> Result<usize> {
    if target.storage().read_only() {
        return Err(exn::Exn::from(SyncErrorKind::ReadOnly)).or_raise(|| ErrorKind::Sync);
    }
    let walk = SyncWalk { options, message_updater };
    let modified = walk.folder(source, target, true).await.or_raise(|| ErrorKind::Sync)?;
    tracing::info!(modified, "sync finished");
    Ok(modified)
}

struct SyncWalk<'a> {
    options: &'a SyncOptions,
    message_updater: Option<&'a MessageUpdater>,
}

impl SyncWalk<'_> {
    fn message(&self, message: &str) {
        if let Some(updater) = self.message_updater {
            updater(message);
        }
    }

    async fn folder(&self, source: &Folder, target: &Folder, at_root: bool) -> SyncResult<usize> {
        source.load(false).await.or_raise(|| SyncErrorKind::Source)?;
        target.load(false).await.or_raise(|| SyncErrorKind::Target)?;
        let path = source.path().or_raise(|| SyncErrorKind::Source)?;
        if let Some(error) = source.error_status().or_raise(|| SyncErrorKind::Source)? {
            tracing::warn!(path = %path, error = %error, "source folder failed to load; skipped");
            return Ok(0);
        }
        if self.options.force_folders {
            target.ensure_exists().await.or_raise(|| SyncErrorKind::Target)?;
        }
        self.message(&format!("Syncing {path}"));

        let mut modified = 0;
        let mut visited = HashSet::new();
        if !(at_root && self.options.skip_files_at_root) {
            for file in source.files().or_raise(|| SyncErrorKind::Source)? {
                let name = file.name().or_raise(|| SyncErrorKind::Source)?;
                if !self.options.wants_file(&name) {
                    tracing::trace!(path = %path, name = %name, "filtered out");
                    continue;
                }
                visited.insert(canonicalize_name(&name));
                if self.file(&file, target, &name).await? {
                    modified += 1;
                }
            }
        }

        let mut visited_folders = HashSet::new();
        for child in source.folders().or_raise(|| SyncErrorKind::Source)? {
            let name = child.name().or_raise(|| SyncErrorKind::Source)?;
            if !self.options.wants_folder(&name) {
                tracing::trace!(path = %path, name = %name, "folder filtered out");
                continue;
            }
            visited_folders.insert(canonicalize_name(&name));
            let target_child = target.ensure_folder(&name).or_raise(|| SyncErrorKind::Target)?;
            modified += Box::pin(self.folder(&child, &target_child, false)).await?;
        }

        if self.options.remove_on_target {
            modified += self.remove_unvisited(target, at_root, &visited, &visited_folders).await?;
        }
        Ok(modified)
    }

    /// Copy one source file onto the target folder. Returns whether the
    /// target was written.
    async fn file(&self, source: &File, target: &Folder, name: &str) -> SyncResult<bool> {
        let existing = target.file(name).or_raise(|| SyncErrorKind::Target)?;
        if existing.is_some() && self.options.dont_overwrite_existing_files {
            return Ok(false);
        }
        source.load_content(false).await.or_raise(|| SyncErrorKind::Source)?;
        let Some(content) = source.content().or_raise(|| SyncErrorKind::Source)? else {
            let error = source.error_state_message().or_raise(|| SyncErrorKind::Source)?;
            tracing::warn!(name = %name, error = ?error, "source file has no content; skipped");
            return Ok(false);
        };
        let target_file = match existing {
            Some(file) => {
                file.load_content(false).await.or_raise(|| SyncErrorKind::Target)?;
                file
            },
            None => target.ensure_file(name).or_raise(|| SyncErrorKind::Target)?,
        };
        let changed = target_file.set_content(content).or_raise(|| SyncErrorKind::Target)?;
        if !changed && !self.options.force_file_updates {
            return Ok(false);
        }
        target_file.save_content().await.or_raise(|| SyncErrorKind::Target)?;
        tracing::debug!(path = %target_file.path().or_raise(|| SyncErrorKind::Target)?, "synced");
        Ok(true)
    }

    /// Delete target files and folders the walk didn't visit. Returns how many
    /// files went.
    ///
    /// Visited names are canonical, matching how the tree keys children.
    /// Names the filters exclude are left alone, and so are root files when
    /// those are skipped.
    async fn remove_unvisited(
        &self,
        target: &Folder,
        at_root: bool,
        visited: &HashSet<String>,
        visited_folders: &HashSet<String>,
    ) -> SyncResult<usize> {
        let mut removed = 0;
        if !(at_root && self.options.skip_files_at_root) {
            for file in target.files().or_raise(|| SyncErrorKind::Target)? {
                let name = file.name().or_raise(|| SyncErrorKind::Target)?;
                if visited.contains(&canonicalize_name(&name)) || !self.options.wants_file(&name) {
                    continue;
                }
                if target.delete_file(&name).await.or_raise(|| SyncErrorKind::Target)? {
                    tracing::debug!(name = %name, "removed from target");
                    removed += 1;
                }
            }
        }
        for child in target.folders().or_raise(|| SyncErrorKind::Target)? {
            let name = child.name().or_raise(|| SyncErrorKind::Target)?;
            if visited_folders.contains(&canonicalize_name(&name)) || !self.options.wants_folder(&name) {
                continue;
            }
            let files: Vec<File> = child.files_recursive().try_collect().await.or_raise(|| SyncErrorKind::Target)?;
            self.message(&format!("Removing {}", child.path().or_raise(|| SyncErrorKind::Target)?));
            child.delete_this_folder().await.or_raise(|| SyncErrorKind::Target)?;
            tracing::debug!(name = %name, files = files.len(), "removed folder from target");
            removed += files.len();
        }
        Ok(removed)
    }
}
