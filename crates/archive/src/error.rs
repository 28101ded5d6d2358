//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data is not a readable archive. Don't retry with the same input.
    #[display("invalid or corrupted archive")]
    InvalidData,
    /// An entry name escapes the archive root or is otherwise unusable.
    #[display("unsafe entry name: {_0}")]
    UnsafeEntry(#[error(not(source))] String),
    /// Decoding stopped because the expanded content exceeded the limit.
    #[display("archive expands beyond {_0} bytes")]
    TooLarge(#[error(not(source))] u64),
    /// The requested package kind is not recognised.
    #[display("unsupported package kind: {_0}")]
    UnsupportedKind(#[error(not(source))] String),
    /// Writing the archive failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
