//! vfs
//!
//! Virtual filesystem adapters.
//!
//! Both engines read and write the project exclusively through the
//! [`Filesystem`] trait:
//!
//! - [`MemoryFs`] - shared in-memory tree with fault injection, for tests
//! - [`LocalFs`] - a host directory via `tokio::fs`
//!
//! The version-control metadata directory (`/.git`) is part of the tree but
//! excluded from [`list_files`], which is what user-facing walks use.

pub mod local;
pub mod memory;
pub mod traits;

pub use local::LocalFs;
pub use memory::{FailOn, MemoryFs};
pub use traits::{EntryKind, Filesystem, FsError, Metadata};

use crate::core::paths;

/// Name of the version-control metadata directory.
pub const GIT_DIR: &str = ".git";

/// Recursively list every file below `dir`, skipping `.git`.
///
/// Returned paths are absolute and sorted.
pub async fn list_files(fs: &dyn Filesystem, dir: &str) -> Result<Vec<String>, FsError> {
    let mut files = Vec::new();
    let mut pending = vec![paths::resolve_from("/", dir)];

    while let Some(current) = pending.pop() {
        for name in fs.readdir(&current).await? {
            if name == GIT_DIR {
                continue;
            }
            let child = paths::join(&[&current, &name]);
            if fs.stat(&child).await?.is_directory() {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_files_skips_git_metadata() {
        let fs = MemoryFs::with_files([
            ("/README.md", "hi"),
            ("/src/main.js", ""),
            ("/src/util/x.js", ""),
            ("/.git/HEAD", "ref: refs/heads/main"),
        ]);
        let files = list_files(&fs, "/").await.unwrap();
        assert_eq!(files, vec!["/README.md", "/src/main.js", "/src/util/x.js"]);
    }

    #[tokio::test]
    async fn list_files_of_subdirectory() {
        let fs = MemoryFs::with_files([("/a/b.txt", ""), ("/c.txt", "")]);
        assert_eq!(list_files(&fs, "/a").await.unwrap(), vec!["/a/b.txt"]);
    }
}
