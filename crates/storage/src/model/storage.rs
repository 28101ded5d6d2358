use crate::backend::BackendHandle;
use crate::error::{ErrorKind, Result};
use crate::events::{self, StorageEvent};
use crate::model::tree::{ROOT, Tree};
use crate::model::{File, Folder};
use crate::version::VersionContent;
use exn::OptionExt;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A tree of folders and files over one backend.
///
/// Cloning is cheap and yields another handle to the same tree. The tree is
/// populated lazily: nothing is read from the backend until a folder is
/// [loaded](Folder::load) or a file's content is [loaded](File::load_content).
///
/// ```
/// use quarry_storage::Storage;
/// use quarry_storage::backend::{Backend, KvBackend, MemoryKv};
/// # async fn example() -> quarry_storage::error::Result<()> {
/// let storage = Storage::new(KvBackend::new("scratch", MemoryKv::default()).into_handle());
/// let file = storage.root_folder().ensure_file_from_relative_path("/packs/manifest.json")?;
/// file.set_content("{}")?;
/// file.save_content().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Storage {
    shared: Arc<Shared>,
}

struct Shared {
    id: u64,
    backend: BackendHandle,
    read_only: bool,
    tree: Mutex<Tree>,
    events: broadcast::Sender<StorageEvent>,
    disposed: AtomicBool,
}

impl Storage {
    pub fn new(backend: BackendHandle) -> Self {
        Self::with_read_only(backend.clone(), backend.read_only())
    }

    /// Build a storage whose read-only flag overrides the backend's.
    ///
    /// A backend that is itself read-only stays read-only.
    pub fn with_read_only(backend: BackendHandle, read_only: bool) -> Self {
        let read_only = read_only || backend.read_only();
        Self {
            shared: Arc::new(Shared {
                id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                read_only,
                tree: Mutex::new(Tree::new()),
                events: events::channel(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique identifier of this storage instance.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        self.shared.backend.name()
    }

    pub fn read_only(&self) -> bool {
        self.shared.read_only
    }

    /// The backend's native path delimiter.
    pub fn delimiter(&self) -> char {
        self.shared.backend.delimiter()
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.shared.backend
    }

    pub fn root_folder(&self) -> Folder {
        Folder::new(self.clone(), ROOT)
    }

    /// Receive every [`StorageEvent`] emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }

    /// The whole undo log, oldest first.
    pub fn versions(&self) -> Result<Vec<VersionContent>> {
        Ok(self.lock()?.versions.entries().to_vec())
    }

    /// The file a version was recorded for, if it is still in the tree.
    pub fn file_for_version(&self, id: Uuid) -> Result<Option<File>> {
        let tree = self.lock()?;
        let Some(entry) = tree.versions.get(id) else {
            return Ok(None);
        };
        match tree.file(entry.file) {
            Ok(_) => Ok(Some(File::new(self.clone(), entry.file))),
            Err(_) => Ok(None),
        }
    }

    /// Discard every version recorded after `id`. Returns how many were dropped.
    pub fn trim_after_version(&self, id: Uuid) -> Result<usize> {
        let mut tree = self.lock()?;
        let index = tree.versions.position(id).ok_or_raise(|| ErrorKind::NotFound(format!("version {id}")))?;
        let dropped = tree.versions.truncate_after(index);
        for entry in &dropped {
            if let Ok(node) = tree.file_mut(entry.file) {
                node.versions.retain(|version| *version != entry.id);
            }
        }
        tracing::debug!(storage = self.name(), %id, dropped = dropped.len(), "trimmed version history");
        Ok(dropped.len())
    }

    /// Restore every file touched at or after version `id` to the content it
    /// had when that version was recorded.
    ///
    /// Entries are undone newest first, so a file edited several times ends
    /// up with its oldest recorded content. Restoration is not itself
    /// versioned and leaves the log untouched; call
    /// [`trim_after_version`](Self::trim_after_version) to discard the redo
    /// tail. Restored files are marked as needing a save. Returns the number
    /// of entries applied.
    #[tracing::instrument(level = "debug", skip(self), fields(storage = self.name()))]
    pub fn set_to_version(&self, id: Uuid) -> Result<usize> {
        self.ensure_writable()?;
        let mut updated = Vec::new();
        let applied = {
            let mut tree = self.lock()?;
            let index = tree.versions.position(id).ok_or_raise(|| ErrorKind::NotFound(format!("version {id}")))?;
            let entries: Vec<VersionContent> = tree.versions.entries()[index..].iter().rev().cloned().collect();
            for entry in &entries {
                // Files that have since left the tree have nothing to restore into.
                let Ok(node) = tree.file_mut(entry.file) else {
                    continue;
                };
                node.content = entry.content.clone();
                // Restored content differs from what was last persisted.
                node.modified = Some(UtcDateTime::now());
                updated.push(entry.path.clone());
            }
            entries.len()
        };
        updated.sort();
        updated.dedup();
        for path in updated {
            self.emit(StorageEvent::FileContentsUpdated { path });
        }
        Ok(applied)
    }

    /// Dispose the whole tree. Every handle into it fails from now on.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.tree.lock().dispose_all();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Tree>> {
        if self.is_disposed() {
            exn::bail!(ErrorKind::Disposed(format!("storage {}", self.name())));
        }
        Ok(self.shared.tree.lock())
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only() {
            exn::bail!(ErrorKind::ReadOnly(self.name().to_string()));
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: StorageEvent) {
        tracing::trace!(storage = self.name(), ?event, "storage event");
        // No subscribers is not an error.
        let _ = self.shared.events.send(event);
    }
}

impl PartialEq for Storage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Storage {}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("id", &self.shared.id)
            .field("backend", &self.name())
            .field("read_only", &self.read_only())
            .finish()
    }
}
