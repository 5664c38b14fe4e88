//! core::paths
//!
//! POSIX path algebra for the virtual project filesystem.
//!
//! All paths handled by Pyxis are forward-slash strings rooted at the
//! project directory (`/` is the project root). There are no drive letters
//! and no platform separators; the same functions back the emulated `path`
//! module and module-specifier resolution.
//!
//! # Example
//!
//! ```
//! use pyxis::core::paths;
//!
//! assert_eq!(paths::normalize("/src//lib/../main.js"), "/src/main.js");
//! assert_eq!(paths::join(&["src", "lib", "x.js"]), "src/lib/x.js");
//! assert_eq!(paths::dirname("/src/main.js"), "/src");
//! assert_eq!(paths::basename("/src/main.js", Some(".js")), "main");
//! assert_eq!(paths::extname("/src/main.test.js"), ".js");
//! ```

/// Collapse duplicate slashes and resolve `.` / `..` segments.
///
/// Absolute paths never climb above `/`. Relative paths keep leading `..`
/// segments that cannot be resolved. A trailing slash is dropped. The empty
/// relative path normalizes to `.`.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ if absolute => {}
                _ => stack.push(".."),
            },
            other => stack.push(other),
        }
    }

    let joined = stack.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join segments with `/` and normalize the result.
///
/// Empty segments are skipped; joining nothing yields `.`.
pub fn join(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return ".".to_string();
    }
    normalize(&joined)
}

/// Resolve `parts` right-to-left against `base` until an absolute path is
/// formed, like `path.resolve` rooted at the project directory.
///
/// ```
/// use pyxis::core::paths::resolve;
///
/// assert_eq!(resolve("/", &["src", "a.js"]), "/src/a.js");
/// assert_eq!(resolve("/", &["src", "/etc", "x"]), "/etc/x");
/// assert_eq!(resolve("/lib", &["../b"]), "/b");
/// ```
pub fn resolve(base: &str, parts: &[&str]) -> String {
    let mut resolved = normalize(base);
    if !resolved.starts_with('/') {
        resolved = format!("/{resolved}");
    }
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if part.starts_with('/') {
            resolved = (*part).to_string();
        } else {
            resolved = format!("{resolved}/{part}");
        }
    }
    normalize(&resolved)
}

/// Resolve a possibly-relative path against a directory.
pub fn resolve_from(dir: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        resolve(dir, &[path])
    }
}

/// The directory portion of a path (`/` for top-level entries).
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None if path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

/// The final path component, with `ext` stripped when it is a suffix.
pub fn basename(path: &str, ext: Option<&str>) -> String {
    let trimmed = path.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match ext {
        Some(ext) if !ext.is_empty() && name.len() > ext.len() && name.ends_with(ext) => {
            name[..name.len() - ext.len()].to_string()
        }
        _ => name.to_string(),
    }
}

/// The extension of the final component, including the dot.
///
/// Dot-files (`.gitignore`) have no extension.
pub fn extname(path: &str) -> String {
    let name = basename(path, None);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx..].to_string(),
    }
}

/// Split a normalized absolute path into its non-empty components.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Every proper ancestor directory of `path`, outermost first, excluding `/`.
///
/// ```
/// use pyxis::core::paths::ancestors;
///
/// assert_eq!(ancestors("/a/b/c.txt"), vec!["/a".to_string(), "/a/b".to_string()]);
/// ```
pub fn ancestors(path: &str) -> Vec<String> {
    let parts = components(path);
    (1..parts.len())
        .map(|n| format!("/{}", parts[..n].join("/")))
        .collect()
}
