//! Reconciling two storage trees.
//!
//! - [`diff`] compares a folder against another (on any backend) and yields
//!   a [`DifferenceSet`] that can be exported as a portable patch.
//! - [`sync`] pushes one folder's files onto another, optionally removing
//!   what the source no longer has.
//!
//! Both walk their trees strictly sequentially, one awaited operation at a
//! time, and tolerate nodes whose last load failed.

pub mod diff;
pub mod error;
pub mod sync;

pub use crate::diff::{
    DifferenceSet, FileDifference, FileDifferenceType, FolderDifference, FolderDifferenceType, get_differences,
};
pub use crate::sync::{MessageUpdater, SyncOptions, matches_list, sync_folder_to};
