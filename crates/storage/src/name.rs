//! Child name handling shared by every backend.
//!
//! Two things live here: turning whatever a medium hands us into the key a
//! folder indexes its children by, and deciding which names a tree should
//! surface at all.

use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(LEVELDB_LOG_REGEX, r"^\d+\.log$");
regex!(LEVELDB_MANIFEST_REGEX, r"^MANIFEST-\d+$");

/// Names that collide with built-in keys of generic maps in consuming layers.
const RESERVED_NAME: &str = "constructor";
const RESERVED_REPLACEMENT: &str = "__constructor";

/// Extensions a tree will surface. Anything else is invisible.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "bin",
    "css",
    "csv",
    "dat",
    "dat_old",
    "fragment",
    "fsb",
    "geometry",
    "gif",
    "html",
    "ico",
    "jpeg",
    "jpg",
    "js",
    "json",
    "lang",
    "ldb",
    "log",
    "map",
    "material",
    "mcaddon",
    "mcfunction",
    "mcpack",
    "mcstructure",
    "mctemplate",
    "mcworld",
    "md",
    "mjs",
    "mp3",
    "nbt",
    "ogg",
    "png",
    "properties",
    "svg",
    "tga",
    "toml",
    "ts",
    "ttf",
    "txt",
    "vertex",
    "wav",
    "webp",
    "xml",
    "yaml",
    "yml",
    "zip",
];

/// Extension-less (or oddly-suffixed) names that are still content, mostly
/// LevelDB bookkeeping inside world folders.
const ALLOWED_BARE_NAMES: &[&str] = &["CURRENT", "LOCK", "LOG", "LOG.old"];

const IGNORABLE_FOLDERS: &[&str] = &["node_modules", "out", "dist", "build", "target", "__pycache__"];
const ALLOWED_DOT_FOLDERS: &[&str] = &[".vscode", ".github"];

/// Decode escapes and strip surrounding whitespace and delimiters until
/// nothing changes. Keeps the original spelling otherwise.
///
/// This is the name a node *displays* and the name handed to the medium.
pub fn clean_name(name: &str) -> String {
    let mut current = name.to_string();
    loop {
        let next = current
            .replace("%20", " ")
            .replace("%28", "(")
            .replace("%29", ")")
            .trim()
            .trim_matches(|c: char| c == '/' || c == '\\')
            .to_string();
        // Each pass that changes anything makes the string shorter.
        if next == current {
            return current;
        }
        current = next;
    }
}

/// The key a folder indexes a child by.
///
/// [`clean_name`] followed by remapping the reserved token `constructor` to
/// `__constructor`. Stable: canonicalising a canonical name is a no-op.
///
/// ```
/// use quarry_storage::canonicalize_name;
/// assert_eq!(canonicalize_name(" /My%20Pack%28 1%29/ "), "My Pack( 1)");
/// assert_eq!(canonicalize_name("constructor"), "__constructor");
/// ```
pub fn canonicalize_name(name: &str) -> String {
    let cleaned = clean_name(name);
    match cleaned.as_str() {
        RESERVED_NAME => RESERVED_REPLACEMENT.to_string(),
        _ => cleaned,
    }
}

/// Lowercase extension without the dot, if the name has one.
pub fn extension(name: &str) -> Option<String> {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Whether enumeration should surface a file with this name.
pub fn is_usable_file_name(name: &str) -> bool {
    if ALLOWED_BARE_NAMES.contains(&name) || LEVELDB_MANIFEST_REGEX.is_match(name) {
        return true;
    }
    extension(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether enumeration should skip a folder with this name entirely.
pub fn is_ignorable_folder(name: &str) -> bool {
    if name.starts_with('.') {
        return !ALLOWED_DOT_FOLDERS.contains(&name);
    }
    IGNORABLE_FOLDERS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("manifest.json", "manifest.json")]
    #[case("  manifest.json  ", "manifest.json")]
    #[case("/folder/", "folder")]
    #[case("\\folder\\", "folder")]
    #[case("My%20Pack", "My Pack")]
    #[case("%28beta%29", "(beta)")]
    #[case("%2520", "%2520")]
    #[case("%20%20name%20", "name")]
    #[case("constructor", "__constructor")]
    #[case("/constructor/", "__constructor")]
    #[case("__constructor", "__constructor")]
    #[case("constructors", "constructors")]
    fn test_canonicalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(canonicalize_name(input), expected);
    }

    #[test]
    fn test_clean_keeps_reserved_spelling() {
        assert_eq!(clean_name(" constructor "), "constructor");
    }

    #[rstest]
    #[case("entity.json", true)]
    #[case("texture.PNG", true)]
    #[case("000005.ldb", true)]
    #[case("000003.log", true)]
    #[case("MANIFEST-000001", true)]
    #[case("CURRENT", true)]
    #[case("LOG.old", true)]
    #[case("program.exe", false)]
    #[case("Makefile", false)]
    #[case("archive.tar.gz", false)]
    fn test_usable_file_name(#[case] name: &str, #[case] usable: bool) {
        assert_eq!(is_usable_file_name(name), usable);
    }

    #[rstest]
    #[case(".git", true)]
    #[case(".vscode", false)]
    #[case(".github", false)]
    #[case("node_modules", true)]
    #[case("dist", true)]
    #[case("behavior_packs", false)]
    fn test_ignorable_folder(#[case] name: &str, #[case] ignorable: bool) {
        assert_eq!(is_ignorable_folder(name), ignorable);
    }

    proptest! {
        #[test]
        fn canonicalize_is_stable(input in ".{0,40}") {
            let once = canonicalize_name(&input);
            prop_assert_eq!(canonicalize_name(&once), once);
        }

        #[test]
        fn canonicalize_is_stable_on_escapes(input in "[ /\\\\a-c%0-9()]{0,30}") {
            let once = canonicalize_name(&input);
            prop_assert_eq!(canonicalize_name(&once), once);
        }
    }
}
