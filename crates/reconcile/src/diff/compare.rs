//! Content equality and path rebasing used by the diff walk.

use quarry_storage::Content;
use quarry_storage::name::extension;

/// Whether two file contents are the same for diffing purposes.
///
/// JSON files are compared after parsing and re-serialising both sides, so
/// whitespace and indentation changes don't count as differences. If either
/// side fails to parse, the raw bytes are compared instead.
pub fn file_contents_equal(name: &str, original: &Content, updated: &Content) -> bool {
    if original.same_as(updated) {
        return true;
    }
    if extension(name).as_deref() != Some("json") {
        return false;
    }
    match (normalise_json(original), normalise_json(updated)) {
        (Some(original), Some(updated)) => original == updated,
        _ => false,
    }
}

fn normalise_json(content: &Content) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(content.as_bytes()).ok()?;
    serde_json::to_string(&value).ok()
}

/// `path` relative to the folder at `root`, both storage-relative.
///
/// ```
/// use quarry_reconcile::diff::relative_to;
/// assert_eq!(relative_to("/packs/", "/packs/a/b.json"), "/a/b.json");
/// assert_eq!(relative_to("/", "/a.json"), "/a.json");
/// ```
pub fn relative_to(root: &str, path: &str) -> String {
    let rest = path.strip_prefix(root).unwrap_or(path);
    format!("/{}", rest.trim_start_matches('/'))
}

/// Re-express a path found below `updated_folder` in the coordinate space of
/// `original_folder`.
///
/// The folders are the two sides of a matched pair, so their names may
/// differ (a renamed template folder, say). The `updated_folder` prefix is
/// swapped for `original_folder`; nothing else in the path is interpreted.
///
/// ```
/// use quarry_reconcile::diff::rebase_path;
/// assert_eq!(rebase_path("/a/b/new.json", "/a/b/", "/x/a/"), "/x/a/new.json");
/// ```
///
/// All arguments are relative paths; the folders end with `/`.
pub fn rebase_path(path: &str, updated_folder: &str, original_folder: &str) -> String {
    let rest = path.strip_prefix(updated_folder).unwrap_or(path);
    format!("{original_folder}{}", rest.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.json", r#"{"a":1}"#, "{\n  \"a\": 1\n}", true)]
    #[case("a.json", r#"{"a":1}"#, r#"{"a":2}"#, false)]
    #[case("a.json", r#"{"a":1,"b":2}"#, r#"{ "b": 2, "a": 1 }"#, true)]
    #[case("a.json", "{not json", "{not json ", false)]
    #[case("a.lang", "a=b", "a=b\n", false)]
    #[case("a.lang", "a=b", "a=b", true)]
    fn test_file_contents_equal(#[case] name: &str, #[case] a: &str, #[case] b: &str, #[case] equal: bool) {
        assert_eq!(file_contents_equal(name, &Content::from(a), &Content::from(b)), equal);
    }

    #[test]
    fn test_binary_and_text_compare_by_bytes() {
        let text = Content::from("abc");
        let bytes = Content::Bytes(b"abc".to_vec());
        assert!(file_contents_equal("a.png", &text, &bytes));
    }

    #[rstest]
    #[case("/b/x.json", "/b/", "/a/", "/a/x.json")]
    #[case("/my_pack/texts/en.lang", "/my_pack/texts/", "/starter/texts/", "/starter/texts/en.lang")]
    #[case("/x.json", "/", "/", "/x.json")]
    #[case("/x/new/deep.json", "/x/", "/x/", "/x/new/deep.json")]
    #[case::repeated_name("/a/b/new.json", "/a/b/", "/x/a/", "/x/a/new.json")]
    #[case::repeated_deeper("/a/b/a/c.json", "/a/b/", "/x/a/", "/x/a/a/c.json")]
    fn test_rebase_path(#[case] path: &str, #[case] updated: &str, #[case] original: &str, #[case] expected: &str) {
        assert_eq!(rebase_path(path, updated, original), expected);
    }

    #[rstest]
    #[case("/", "/a/b.json", "/a/b.json")]
    #[case("/a/", "/a/b.json", "/b.json")]
    #[case("/z/", "/a/b.json", "/a/b.json")]
    fn test_relative_to(#[case] root: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(relative_to(root, path), expected);
    }
}
