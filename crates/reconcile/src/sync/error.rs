//! Error types for the [`sync`](super) module.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a sync failure.
///
/// ### Operational Errors
/// - [`ErrorKind::ReadOnly`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Source`]
/// - [`ErrorKind::Target`]
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The target storage refuses writes; nothing was attempted.
    #[display("target storage is read-only")]
    ReadOnly,
    /// Listing or reading the source tree failed hard.
    #[display("reading the source failed")]
    Source,
    /// Writing to or deleting from the target tree failed.
    #[display("writing the target failed")]
    Target,
}
