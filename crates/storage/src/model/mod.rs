//! The `Storage` / `Folder` / `File` object model.
//!
//! A [`Storage`] owns one tree of nodes over one [`Backend`](crate::backend::Backend).
//! [`Folder`] and [`File`] are lightweight handles into that tree; every
//! backend shares this implementation and only differs in how it lists,
//! reads and writes.

mod file;
mod folder;
mod storage;
mod tree;

pub use self::file::{File, FileKey};
pub use self::folder::Folder;
pub use self::storage::Storage;
pub use self::tree::{FileId, FolderId};

#[cfg(test)]
mod tests;
