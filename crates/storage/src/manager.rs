//! Side table for objects that higher layers hang off files.
//!
//! The storage core never looks at these. A consuming layer picks its own
//! type (usually an enum of the domain objects it knows about) and keys it by
//! [`FileKey`], which stays unique across every storage in the process.

use crate::model::{File, FileKey};
use std::collections::HashMap;

/// Typed attachments keyed by file identity.
#[derive(Debug)]
pub struct Attachments<M> {
    entries: HashMap<FileKey, M>,
}

impl<M> Default for Attachments<M> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<M> Attachments<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `manager` to `file`, returning whatever was attached before.
    pub fn attach(&mut self, file: &File, manager: M) -> Option<M> {
        self.entries.insert(file.key(), manager)
    }

    pub fn get(&self, file: &File) -> Option<&M> {
        self.entries.get(&file.key())
    }

    pub fn get_mut(&mut self, file: &File) -> Option<&mut M> {
        self.entries.get_mut(&file.key())
    }

    pub fn has(&self, file: &File) -> bool {
        self.entries.contains_key(&file.key())
    }

    pub fn detach(&mut self, file: &File) -> Option<M> {
        self.entries.remove(&file.key())
    }

    /// Drop every attachment belonging to a storage, e.g. after disposing it.
    pub fn forget_storage(&mut self, storage: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.storage != storage);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
