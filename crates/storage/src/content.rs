//! File content and the name → encoding table.

use crate::error::{ErrorKind, Result};
use crate::name::{LEVELDB_LOG_REGEX, LEVELDB_MANIFEST_REGEX, extension};
use exn::ResultExt;
use std::fmt;

/// Extensions whose content is never valid text.
const BINARY_EXTENSIONS: &[&str] = &[
    "bin",
    "dat",
    "dat_old",
    "fsb",
    "gif",
    "ico",
    "jpeg",
    "jpg",
    "ldb",
    "mcaddon",
    "mcpack",
    "mcstructure",
    "mctemplate",
    "mcworld",
    "mp3",
    "nbt",
    "ogg",
    "png",
    "tga",
    "ttf",
    "wav",
    "webp",
    "zip",
];

/// How a file's bytes should be materialised once loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Binary,
}

impl Encoding {
    /// Infer the encoding from a file name.
    ///
    /// Binary formats are listed by extension. LevelDB's numbered write-ahead
    /// logs (`000003.log`) and `MANIFEST-000001` files are binary too, despite
    /// looking like text.
    pub fn for_name(name: &str) -> Self {
        if LEVELDB_LOG_REGEX.is_match(name) || LEVELDB_MANIFEST_REGEX.is_match(name) {
            return Self::Binary;
        }
        match extension(name) {
            Some(ext) if BINARY_EXTENSIONS.contains(&ext.as_str()) => Self::Binary,
            _ => Self::Text,
        }
    }
}

/// Loaded file content. Either UTF-8 text or a raw byte buffer.
#[derive(Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Materialise raw bytes in the requested encoding.
    ///
    /// Text that is not valid UTF-8 is an [`InvalidData`](ErrorKind::InvalidData) error.
    pub fn decode(bytes: Vec<u8>, encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Binary => Ok(Self::Bytes(bytes)),
            Encoding::Text => {
                let text = String::from_utf8(bytes).or_raise(|| ErrorKind::InvalidData("content is not UTF-8".into()))?;
                Ok(Self::Text(text))
            },
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Text view, if the content is text or bytes that happen to be UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Byte-for-byte equality, regardless of which variant holds the data.
    pub fn same_as(&self, other: &Content) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("manifest.json", Encoding::Text)]
    #[case("en_US.lang", Encoding::Text)]
    #[case("pack_icon.png", Encoding::Binary)]
    #[case("sound.OGG", Encoding::Binary)]
    #[case("000005.ldb", Encoding::Binary)]
    #[case("000003.log", Encoding::Binary)]
    #[case("MANIFEST-000001", Encoding::Binary)]
    #[case("LOG", Encoding::Text)]
    #[case("debug.log", Encoding::Text)]
    #[case("CURRENT", Encoding::Text)]
    fn test_encoding_for_name(#[case] name: &str, #[case] expected: Encoding) {
        assert_eq!(Encoding::for_name(name), expected);
    }

    #[test]
    fn test_decode() {
        assert_eq!(Content::decode(b"abc".to_vec(), Encoding::Text).unwrap(), Content::Text("abc".into()));
        assert_eq!(Content::decode(vec![0xff], Encoding::Binary).unwrap(), Content::Bytes(vec![0xff]));
        let err = Content::decode(vec![0xff, 0xfe], Encoding::Text).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }

    #[test]
    fn test_same_as_ignores_variant() {
        assert!(Content::from("abc").same_as(&Content::from(b"abc".as_slice())));
        assert!(!Content::from("abc").same_as(&Content::from("abd")));
    }
}
