//! Per-storage undo log.
//!
//! Every successful content change pushes the file's *prior* content onto the
//! log under a fresh id. Nothing here decides when to snapshot; coalescing
//! rapid edits is a concern for whoever drives the edits.

use crate::content::Content;
use crate::model::FileId;
use time::UtcDateTime;
use uuid::Uuid;

/// A snapshot of a file's content as it was before a change.
#[derive(Clone, Debug)]
pub struct VersionContent {
    pub id: Uuid,
    /// The file the snapshot belongs to.
    pub file: FileId,
    /// Storage-relative path of the file at the time of the change.
    pub path: String,
    /// Content before the change (`None` if the file had none).
    pub content: Option<Content>,
    /// The file's `modified` stamp before the change.
    pub version_time: Option<UtcDateTime>,
}

#[derive(Default)]
pub(crate) struct VersionLog {
    entries: Vec<VersionContent>,
}

impl VersionLog {
    pub(crate) fn push(&mut self, file: FileId, path: String, content: Option<Content>, version_time: Option<UtcDateTime>) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(VersionContent { id, file, path, content, version_time });
        id
    }

    pub(crate) fn entries(&self) -> &[VersionContent] {
        &self.entries
    }

    pub(crate) fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub(crate) fn get(&self, id: Uuid) -> Option<&VersionContent> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Drop every entry after `index`, returning them oldest first.
    pub(crate) fn truncate_after(&mut self, index: usize) -> Vec<VersionContent> {
        match index + 1 < self.entries.len() {
            true => self.entries.split_off(index + 1),
            false => Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
