use crate::PackageKind;
use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::{path::Path, str::FromStr};

impl Display for PackageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for PackageKind {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for PackageKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "zip" => Ok(PackageKind::Zip),
            "mcpack" => Ok(PackageKind::Pack),
            "mcaddon" => Ok(PackageKind::Addon),
            "mcworld" => Ok(PackageKind::World),
            "mctemplate" => Ok(PackageKind::Template),
            _ => exn::bail!(ErrorKind::UnsupportedKind(s.to_string())),
        }
    }
}

impl PackageKind {
    /// Every recognised kind, in no particular order.
    pub const ALL: [PackageKind; 5] =
        [PackageKind::Zip, PackageKind::Pack, PackageKind::Addon, PackageKind::World, PackageKind::Template];

    /// Detect a package kind from a file extension.
    ///
    /// Returns `None` for anything that isn't a container, including
    /// dotfiles such as `.mcpack` that have no extension at all.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(|ext| ext.parse().ok())
    }

    /// Returns the file extension for this kind, including the leading dot.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            PackageKind::Zip => ".zip",
            PackageKind::Pack => ".mcpack",
            PackageKind::Addon => ".mcaddon",
            PackageKind::World => ".mcworld",
            PackageKind::Template => ".mctemplate",
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        &self.extension()[1..]
    }
}
