//! Path helpers for `/`-separated store paths.

/// Parent folder of a path, without trailing separator. Top-level files have
/// the empty string as parent.
pub fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Canonical folder form: no trailing separator, root is `""`.
pub fn normalize_dir(dir: &str) -> &str {
    dir.trim_end_matches('/')
}

/// Whether `path` lies directly in `anchor`, or anywhere below it when
/// `include_subdirectories` is set.
pub fn is_in_scope(path: &str, anchor: &str, include_subdirectories: bool) -> bool {
    let anchor = normalize_dir(anchor);
    let parent = parent_dir(path);

    if parent == anchor {
        return true;
    }
    if !include_subdirectories {
        return false;
    }
    if anchor.is_empty() {
        // Every path sits below the store root
        return true;
    }
    parent
        .strip_prefix(anchor)
        .map_or(false, |rest| rest.starts_with('/'))
}

/// Whether any component of the path starts with `.`.
pub fn is_hidden(path: &str) -> bool {
    path.split('/')
        .any(|component| component.starts_with('.') && component != "." && component != "..")
}
