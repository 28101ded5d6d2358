//! Error types for the [`diff`](super) module.

use derive_more::{Display, Error};

/// A diff error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for diff operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a diff failure.
///
/// Soft failures of either tree (unreachable files, folders that failed to
/// list) are not errors here: the walk skips them. What remains is misuse of
/// the storage API and failures to package the result.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading either tree (or writing the patch target) failed hard.
    Storage,
    /// The differences could not be encoded as an archive.
    Archive,
}
