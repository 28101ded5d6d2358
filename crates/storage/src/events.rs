//! Change notifications.
//!
//! Each [`Storage`](crate::Storage) owns its own broadcast channel; there is
//! no process-wide bus. Subscribers that fall behind lose the oldest events
//! (see [`tokio::sync::broadcast`]), and emitting with no subscribers is fine.

use tokio::sync::broadcast;

pub(crate) const EVENT_CAPACITY: usize = 256;

/// Something changed in a storage's tree. Paths are storage-relative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageEvent {
    /// A file appeared in the tree (created or discovered by a load).
    FileAdded { path: String },
    /// A file left the tree.
    FileRemoved { path: String },
    /// A file's in-memory content changed.
    FileContentsUpdated { path: String },
    /// A folder was moved to a new path.
    FolderMoved { from: String, to: String },
}

impl StorageEvent {
    pub fn path(&self) -> &str {
        match self {
            Self::FileAdded { path } | Self::FileRemoved { path } | Self::FileContentsUpdated { path } => path,
            Self::FolderMoved { to, .. } => to,
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<StorageEvent> {
    let (sender, _) = broadcast::channel(EVENT_CAPACITY);
    sender
}
