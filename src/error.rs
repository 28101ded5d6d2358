//! Binary Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open storage {_0:?}")]
    Open(#[error(not(source))] String),
    #[display("no folder {_1:?} in storage {_0:?}")]
    MissingFolder(#[error(not(source))] String, #[error(not(source))] String),
    #[display("storage operation failed")]
    Storage,
    #[display("reconcile operation failed")]
    Reconcile,
    #[display("I/O error: {_0}")]
    Io(#[error(not(source))] String),
}
