//! runtime::resolve
//!
//! Module specifier classification and the candidate paths probed for it.
//!
//! # Probe order
//!
//! Relative (`./`, `../`) and absolute specifiers are resolved against the
//! requiring module's directory, then probed as: the literal path, `.js`,
//! `.json`, `<path>/index.js`, `<path>/package.json`.
//!
//! Bare specifiers probe `/node_modules/<name>` with the same suffixes and
//! finally the project root (`/<name>`, `.js`, `.json`). What is not found
//! locally may still come from a CDN; that step lives in the loader.

use crate::core::paths;

/// Names handled by the runtime itself. Only the first four have an
/// implementation.
pub const BUILTIN_MODULES: [&str; 8] = [
    "fs",
    "path",
    "os",
    "util",
    "crypto",
    "http",
    "url",
    "querystring",
];

pub fn is_builtin(specifier: &str) -> bool {
    BUILTIN_MODULES.contains(&specifier)
}

/// `./x`, `../x` and `/x` resolve against the filesystem only.
pub fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

/// Bare specifiers that may be fetched from a CDN.
pub fn is_package_name(specifier: &str) -> bool {
    !specifier.is_empty() && !is_path_like(specifier) && !is_builtin(specifier)
}

/// Every path to try for `specifier` required from `dir`, in order.
pub fn candidates(specifier: &str, dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    if is_path_like(specifier) {
        let base = paths::resolve_from(dir, specifier);
        push_probes(&mut out, &base);
    } else {
        push_probes(&mut out, &format!("/node_modules/{specifier}"));
        let root = paths::normalize(&format!("/{specifier}"));
        for path in [root.clone(), format!("{root}.js"), format!("{root}.json")] {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}

fn push_probes(out: &mut Vec<String>, base: &str) {
    out.push(base.to_string());
    if !base.ends_with(".js") {
        out.push(format!("{base}.js"));
    }
    if !base.ends_with(".json") {
        out.push(format!("{base}.json"));
    }
    out.push(format!("{base}/index.js"));
    out.push(format!("{base}/package.json"));
}

/// Whether a resolved file is loaded as JSON rather than executed.
pub fn is_json(path: &str) -> bool {
    path.ends_with(".json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("querystring"));
        assert!(!is_builtin("fs/promises"));
        assert!(!is_package_name("path"));
        assert!(is_package_name("lodash"));
        assert!(!is_package_name("./lodash"));
    }

    #[test]
    fn relative_probe_order() {
        assert_eq!(
            candidates("./lib/util", "/src"),
            vec![
                "/src/lib/util",
                "/src/lib/util.js",
                "/src/lib/util.json",
                "/src/lib/util/index.js",
                "/src/lib/util/package.json",
            ]
        );
    }

    #[test]
    fn explicit_extension_skips_its_own_suffix() {
        let probes = candidates("../data.json", "/src/app");
        assert_eq!(probes[0], "/src/data.json");
        assert_eq!(probes[1], "/src/data.json.js");
        assert!(!probes.contains(&"/src/data.json.json".to_string()));
    }

    #[test]
    fn absolute_specifiers_ignore_the_directory() {
        assert_eq!(candidates("/a.js", "/deep/dir")[0], "/a.js");
    }

    #[test]
    fn bare_specifiers() {
        assert_eq!(
            candidates("left-pad", "/src"),
            vec![
                "/node_modules/left-pad",
                "/node_modules/left-pad.js",
                "/node_modules/left-pad.json",
                "/node_modules/left-pad/index.js",
                "/node_modules/left-pad/package.json",
                "/left-pad",
                "/left-pad.js",
                "/left-pad.json",
            ]
        );
    }

    #[test]
    fn scoped_packages() {
        let probes = candidates("@acme/widgets", "/");
        assert_eq!(probes[0], "/node_modules/@acme/widgets");
        assert!(probes.contains(&"/node_modules/@acme/widgets/index.js".to_string()));
        assert_eq!(probes.last().map(String::as_str), Some("/@acme/widgets.json"));
    }
}
