//! Package containers presented as plain file maps.
//!
//! Some content ships as a single compressed container (a `.mcpack`, a
//! `.mcworld`, or a plain `.zip`). This crate provides:
//!
//! - **Kind detection** from file names ([`PackageKind::from_path`])
//! - **In-memory decoding** into an [`Archive`] of `/`-delimited entry paths
//!   ([`Archive::decode`], [`Archive::decode_with_limit`])
//! - **Encoding** an [`Archive`] back into zip bytes ([`Archive::encode`])
//!
//! Everything is fully materialised in memory; there is no streaming API.

mod codec;
pub mod error;
mod kind;

pub use crate::codec::Archive;

/// A recognised package container format.
///
/// All of these are zip files on the inside; the extension only tells the
/// consuming application what to expect in the contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// Plain zip archive (.zip)
    Zip,
    /// Single pack (.mcpack)
    Pack,
    /// Bundle of packs (.mcaddon)
    Addon,
    /// Saved world (.mcworld)
    World,
    /// World template (.mctemplate)
    Template,
}
