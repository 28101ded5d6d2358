//! Reconcile Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The [`diff`](crate::diff) and
//! [`sync`](crate::sync) modules raise their own kinds; the public entry
//! points wrap them in one of these.

use derive_more::{Display, Error};

/// A reconcile error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reconcile operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("storage operation failed")]
    Storage,
    #[display("computing differences failed")]
    Diff,
    #[display("synchronising folders failed")]
    Sync,
    #[display("applying differences failed")]
    Patch,
    #[display("packaging differences failed")]
    Archive,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Only a storage failure can be transient; the others wrap a storage
    /// failure or a malformed tree, and the storage frame below says which.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage => true,
            Self::Diff | Self::Sync | Self::Patch | Self::Archive => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Storage, true)]
    #[case(ErrorKind::Diff, false)]
    #[case(ErrorKind::Sync, false)]
    #[case(ErrorKind::Patch, false)]
    #[case(ErrorKind::Archive, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] retryable: bool) {
        assert_eq!(kind.is_retryable(), retryable);
    }
}
