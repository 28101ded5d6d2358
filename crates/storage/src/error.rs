//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Failures come in two flavours. *Hard* failures are misuse of the API
//! (bad paths, writes against a read-only storage, touching a disposed node)
//! and are always propagated. *Soft* failures describe an unreliable medium
//! (network, missing documents, undecodable content); the load paths record
//! them on the node they concern and carry on. [`ErrorKind::is_soft`] is the
//! single place that decides which is which.

use derive_more::{Display, Error};
use quarry_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Relative paths must start with `/` and contain usable segments.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Mutation attempted against a read-only storage.
    #[display("storage is read-only: {_0}")]
    ReadOnly(#[error(not(source))] String),
    /// The node (or its whole storage) has been disposed.
    #[display("use of disposed {_0}")]
    Disposed(#[error(not(source))] String),
    /// Refused to delete a path that looks like it could take out a system.
    #[display("refusing to touch suspicious path: {_0}")]
    DangerousPath(#[error(not(source))] String),
    /// Something expected to exist on the medium does not.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Underlying filesystem failure.
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
    /// Remote medium unreachable or answered with an error.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Content could not be decoded (bad JSON, bad UTF-8, bad base64).
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Package container could not be read or written.
    #[display("archive error: {_0}")]
    Archive(ArchiveErrorKind),
    /// Backend-specific failure that fits nowhere else.
    #[display("backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// An untrusted payload failed validation.
    #[display("untrusted content rejected: {_0}")]
    Untrusted(#[error(not(source))] String),
    /// Operation not supported by this backend.
    #[display("unsupported operation: {_0}")]
    Unsupported(#[error(not(source))] String),
}

impl ErrorKind {
    /// Convert an archive error into a storage error, preserving the archive
    /// crate's `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Archive(inner))
    }

    pub(crate) fn io(err: &std::io::Error, path: impl std::fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            _ => Self::Io(format!("{path}: {err}")),
        }
    }

    /// Returns `true` for failures of the medium rather than of the caller.
    ///
    /// Load paths record these on the affected node instead of propagating.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::InvalidData(_) | Self::NotFound(_))
    }

    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing in this crate retries; this is a hint for calling layers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Io("disk".into()), true)]
    #[case(ErrorKind::Network("timeout".into()), true)]
    #[case(ErrorKind::InvalidData("json".into()), true)]
    #[case(ErrorKind::NotFound("/a.json".into()), true)]
    #[case(ErrorKind::InvalidPath("a".into()), false)]
    #[case(ErrorKind::ReadOnly("http".into()), false)]
    #[case(ErrorKind::Disposed("folder".into()), false)]
    #[case(ErrorKind::DangerousPath("/".into()), false)]
    fn test_soft_classification(#[case] kind: ErrorKind, #[case] soft: bool) {
        assert_eq!(kind.is_soft(), soft);
    }

    #[test]
    fn test_io_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ErrorKind::io(&err, "/x.json"), ErrorKind::NotFound("/x.json".into()));
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(ErrorKind::io(&err, "/x.json"), ErrorKind::Io(_)));
    }

    #[test]
    fn test_archive_conversion() {
        let err = quarry_archive::Archive::decode(b"nope").unwrap_err();
        let converted = ErrorKind::archive(err);
        assert_eq!(*converted, ErrorKind::Archive(ArchiveErrorKind::InvalidData));
    }
}
