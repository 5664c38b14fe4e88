//! Architecture enforcement tests.
//!
//! Layering rules that the compiler cannot check:
//!
//! 1. **Git doorway** - only `src/git/` may use `git2`
//! 2. **Sandboxed scripts** - the runtime and interpreter never touch the
//!    host filesystem directly; all access goes through `vfs::Filesystem`
//! 3. **Thin CLI** - nothing outside `src/cli/` and `main.rs` depends on the CLI

use std::fs;
use std::path::{Path, PathBuf};

fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(rust_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    files.sort();
    files
}

fn src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Files under `src/` (excluding `allowed`) whose text contains `needle`.
fn offenders(needle: &str, allowed: &[&str]) -> Vec<String> {
    let root = src();
    rust_files(&root)
        .into_iter()
        .filter(|path| {
            let rel = path.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/");
            !allowed.iter().any(|prefix| rel.starts_with(prefix))
        })
        .filter(|path| fs::read_to_string(path).unwrap().contains(needle))
        .map(|path| path.display().to_string())
        .collect()
}

#[test]
fn git2_is_confined_to_the_git_module() {
    let found = offenders("git2::", &["git/"]);
    assert!(found.is_empty(), "git2 used outside src/git: {found:?}");
}

#[test]
fn sandbox_never_reaches_the_host_filesystem() {
    let root = src();
    for dir in ["runtime", "js"] {
        for path in rust_files(&root.join(dir)) {
            let text = fs::read_to_string(&path).unwrap();
            for needle in ["std::fs", "tokio::fs"] {
                assert!(
                    !text.contains(needle),
                    "{needle} used in sandboxed code: {}",
                    path.display()
                );
            }
        }
    }
}

#[test]
fn library_does_not_depend_on_the_cli() {
    let found = offenders("crate::cli", &["cli/"]);
    assert!(found.is_empty(), "library modules import the CLI: {found:?}");
}
