//! Path normalization.
//!
//! Normalized paths are absolute but carry no leading slash: the root is
//! `""`, `/usr/bin` is `usr/bin`. Components `.` and empty components are
//! dropped and `..` removes the previous component; `..` at the root stays at
//! the root.

/// Canonical form of `path`, always interpreted from the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    parts.join("/")
}

/// Resolves `path` against the normalized working directory `cwd`.
pub fn resolve(cwd: &str, path: &str) -> String {
    if path.starts_with('/') || cwd.is_empty() {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", cwd, path))
    }
}

/// Last component of a normalized or raw path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Everything before the last component of a normalized path.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}
