//! Virtual folder/file trees over interchangeable storage backends.
//!
//! A [`Storage`] owns one tree of [`Folder`]s and [`File`]s over one
//! [`Backend`](backend::Backend): a local directory, an embedded key-value
//! store, a package container, a static HTTP tree, a hosted repository or a
//! host-provided handle API. The tree, its paths, names, versions and events
//! behave identically whatever the medium.

pub mod backend;
pub mod content;
pub mod error;
pub mod events;
mod manager;
pub mod manifest;
mod model;
pub mod name;
pub mod path;
mod registry;
mod untrusted;
mod version;

pub use crate::backend::BackendHandle;
pub use crate::content::{Content, Encoding};
pub use crate::events::StorageEvent;
pub use crate::manager::Attachments;
pub use crate::model::{File, FileId, FileKey, Folder, FolderId, Storage};
pub use crate::name::canonicalize_name;
pub use crate::registry::{BackendRegistry, BackendSpec};
pub use crate::untrusted::{UntrustedLimits, create_storage_from_untrusted_string};
pub use crate::version::VersionContent;
