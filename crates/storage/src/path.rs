//! Storage-relative path utilities.
//!
//! A storage-relative path is `/`-delimited and rooted at a storage's root
//! folder. Folder paths start and end with `/` (the root is just `/`); file
//! paths are their folder's path followed by the file name. Backends translate
//! these into whatever their medium understands.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Split a relative path into its non-empty segments.
///
/// The path must start with `/`; anything else is a hard
/// [`InvalidPath`](ErrorKind::InvalidPath) failure.
///
/// ```
/// use quarry_storage::path::segments;
/// assert_eq!(segments("/a/b/c.json").unwrap(), vec!["a", "b", "c.json"]);
/// assert!(segments("/").unwrap().is_empty());
/// assert!(segments("a/b").is_err());
/// ```
pub fn segments(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        exn::bail!(ErrorKind::InvalidPath(path.to_string()));
    }
    Ok(path.split('/').filter(|segment| !segment.is_empty()).collect())
}

/// Build a folder path (`/a/b/`) from segments.
pub fn folder_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::from("/");
    for segment in segments {
        path.push_str(segment.as_ref());
        path.push('/');
    }
    path
}

/// Split a relative file path into its folder path and file name.
pub fn split_file_path(path: &str) -> Result<(String, &str)> {
    let mut parts = segments(path)?;
    let Some(name) = parts.pop() else {
        exn::bail!(ErrorKind::InvalidPath(path.to_string()));
    };
    Ok((folder_path(&parts), name))
}

/// The last segment of a relative path, or `""` for the root.
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Rewrite a storage-relative path with a backend's native delimiter.
pub fn with_delimiter(path: &str, delimiter: char) -> String {
    match delimiter {
        '/' => path.to_string(),
        other => path.replace('/', &other.to_string()),
    }
}

/// Map a storage-relative path onto a native path below `root`.
///
/// Ensures that paths can't escape the storage root: `..` is rejected
/// outright rather than resolved, as are null bytes and platform prefixes.
///
/// ```
/// use std::path::Path;
/// use quarry_storage::path::to_native;
/// let root = Path::new("/srv/content");
/// assert_eq!(to_native(root, "/a/b.json").unwrap(), Path::new("/srv/content/a/b.json"));
/// assert_eq!(to_native(root, "/").unwrap(), Path::new("/srv/content"));
/// assert!(to_native(root, "/a/../../etc/passwd").is_err());
/// ```
pub fn to_native(root: &Path, path: &str) -> Result<PathBuf> {
    let mut native = root.to_path_buf();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls; reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                }
                native.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::ParentDir | Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_string())),
        }
    }
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", vec![])]
    #[case("/a/", vec!["a"])]
    #[case("/a//b/c.json", vec!["a", "b", "c.json"])]
    fn test_segments(#[case] input: &str, #[case] expected: Vec<&str>) {
        assert_eq!(segments(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("a")]
    #[case("a/b/")]
    fn test_segments_requires_leading_delimiter(#[case] input: &str) {
        let err = segments(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_folder_path() {
        assert_eq!(folder_path::<&str>(&[]), "/");
        assert_eq!(folder_path(&["a", "b"]), "/a/b/");
    }

    #[test]
    fn test_split_file_path() {
        assert_eq!(split_file_path("/a/b/c.json").unwrap(), ("/a/b/".to_string(), "c.json"));
        assert_eq!(split_file_path("/c.json").unwrap(), ("/".to_string(), "c.json"));
        assert!(split_file_path("/").is_err());
    }

    #[rstest]
    #[case("/", "")]
    #[case("/a/b/", "b")]
    #[case("/a/b/c.json", "c.json")]
    fn test_base_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(base_name(input), expected);
    }

    #[test]
    fn test_with_delimiter() {
        assert_eq!(with_delimiter("/a/b/", '/'), "/a/b/");
        assert_eq!(with_delimiter("/a/b/", '\\'), "\\a\\b\\");
    }

    #[test]
    fn test_to_native_rejects_escapes() {
        let root = Path::new("/srv");
        assert!(to_native(root, "/../etc").is_err());
        assert!(to_native(root, "/a\0b").is_err());
        assert_eq!(to_native(root, "/./a/").unwrap(), Path::new("/srv/a"));
    }
}
