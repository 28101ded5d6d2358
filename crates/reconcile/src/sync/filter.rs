/// Whether `name` matches any of `patterns`.
///
/// A pattern is an exact name, or has a single `*` at the start, the end or
/// both (`*.json`, `texture_*`, `*_old*`). There is no other wildcard
/// syntax; `*` in the middle of a pattern is literal.
pub fn matches_list<S: AsRef<str>>(name: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|pattern| matches_pattern(name, pattern.as_ref()))
}

fn matches_pattern(name: &str, pattern: &str) -> bool {
    let (leading, rest) = match pattern.strip_prefix('*') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };
    let (trailing, core) = match rest.strip_suffix('*') {
        Some(core) => (true, core),
        None => (false, rest),
    };
    match (leading, trailing) {
        (false, false) => name == core,
        (true, false) => name.ends_with(core),
        (false, true) => name.starts_with(core),
        (true, true) => name.contains(core),
    }
}
