//! vfs::memory
//!
//! In-memory filesystem for tests and ephemeral projects.
//!
//! # Design
//!
//! Like the other test doubles in this crate, the store is shared across
//! clones via `Arc<Mutex<...>>`, so a test can hand one clone to an engine
//! and inspect the same state through another. A single operation on a
//! single path can be made to fail ([`FailOn`]) to exercise partial-failure
//! handling.
//!
//! # Example
//!
//! ```
//! use pyxis::vfs::{Filesystem, MemoryFs};
//!
//! # tokio_test::block_on(async {
//! let fs = MemoryFs::with_files([("/src/a.js", "module.exports = 1;")]);
//! assert!(fs.stat("/src").await.unwrap().is_directory());
//! assert_eq!(fs.read_to_string("/src/a.js").await.unwrap(), "module.exports = 1;");
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::traits::{EntryKind, Filesystem, FsError, Metadata};
use crate::core::paths;

/// Which operation should fail, and on which path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    Read(String),
    Write(String),
    Unlink(String),
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug)]
struct MemoryFsInner {
    nodes: BTreeMap<String, Node>,
    fail_on: Option<FailOn>,
    /// Clear `fail_on` after it fires once
    fail_once: bool,
    flushes: usize,
}

/// Shared in-memory filesystem.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    inner: Arc<Mutex<MemoryFsInner>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create an empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            inner: Arc::new(Mutex::new(MemoryFsInner {
                nodes,
                fail_on: None,
                fail_once: false,
                flushes: 0,
            })),
        }
    }

    /// Create a filesystem seeded with files; parent directories are implied.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let fs = Self::new();
        for (path, content) in files {
            fs.insert_file(path.as_ref(), content.as_ref());
        }
        fs
    }

    /// Synchronously place a file, creating parents. Test setup helper.
    pub fn insert_file(&self, path: &str, content: &[u8]) {
        let path = Self::key(path);
        let mut inner = self.lock();
        for dir in paths::ancestors(&path) {
            inner.nodes.insert(dir, Node::Directory);
        }
        inner.nodes.insert(path, Node::File(content.to_vec()));
    }

    /// Make the given operation fail until [`MemoryFs::clear_failure`].
    pub fn fail_on(&self, fail: FailOn) {
        let mut inner = self.lock();
        inner.fail_on = Some(fail);
        inner.fail_once = false;
    }

    /// Make the given operation fail exactly once.
    pub fn fail_once(&self, fail: FailOn) {
        let mut inner = self.lock();
        inner.fail_on = Some(fail);
        inner.fail_once = true;
    }

    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    /// Number of completed [`Filesystem::flush`] calls.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// All file paths currently stored, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        self.lock()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFsInner> {
        // A poisoned lock only means another test thread panicked mid-write;
        // the map itself is still structurally valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(path: &str) -> String {
        paths::resolve_from("/", path)
    }

    fn check_fault(inner: &mut MemoryFsInner, fail: FailOn, op: &'static str) -> Result<(), FsError> {
        if inner.fail_on.as_ref() == Some(&fail) {
            if inner.fail_once {
                inner.fail_on = None;
            }
            let path = match fail {
                FailOn::Read(p) | FailOn::Write(p) | FailOn::Unlink(p) => p,
            };
            return Err(FsError::Injected { op, path });
        }
        Ok(())
    }

    fn parent_is_dir(inner: &MemoryFsInner, path: &str, op: &'static str) -> Result<(), FsError> {
        let parent = paths::dirname(path);
        match inner.nodes.get(&parent) {
            Some(Node::Directory) => Ok(()),
            Some(Node::File(_)) => Err(FsError::NotADirectory { op, path: parent }),
            None => Err(FsError::NotFound {
                op,
                path: path.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = Self::key(path);
        let mut inner = self.lock();
        Self::check_fault(&mut inner, FailOn::Read(path.clone()), "open")?;
        match inner.nodes.get(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => Err(FsError::IsADirectory { op: "read", path }),
            None => Err(FsError::NotFound { op: "open", path }),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let path = Self::key(path);
        let mut inner = self.lock();
        Self::check_fault(&mut inner, FailOn::Write(path.clone()), "open")?;
        if matches!(inner.nodes.get(&path), Some(Node::Directory)) {
            return Err(FsError::IsADirectory { op: "open", path });
        }
        Self::parent_is_dir(&inner, &path, "open")?;
        inner.nodes.insert(path, Node::File(data.to_vec()));
        Ok(())
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let path = Self::key(path);
        let mut inner = self.lock();
        match inner.nodes.get(&path) {
            Some(Node::Directory) if recursive => return Ok(()),
            Some(_) => return Err(FsError::AlreadyExists { op: "mkdir", path }),
            None => {}
        }
        if recursive {
            for dir in paths::ancestors(&path) {
                match inner.nodes.get(&dir) {
                    Some(Node::File(_)) => {
                        return Err(FsError::NotADirectory { op: "mkdir", path: dir })
                    }
                    Some(Node::Directory) => {}
                    None => {
                        inner.nodes.insert(dir, Node::Directory);
                    }
                }
            }
        } else {
            Self::parent_is_dir(&inner, &path, "mkdir")?;
        }
        inner.nodes.insert(path, Node::Directory);
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let path = Self::key(path);
        let inner = self.lock();
        match inner.nodes.get(&path) {
            Some(Node::Directory) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory { op: "scandir", path }),
            None => return Err(FsError::NotFound { op: "scandir", path }),
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let names = inner
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let path = Self::key(path);
        let mut inner = self.lock();
        Self::check_fault(&mut inner, FailOn::Unlink(path.clone()), "unlink")?;
        match inner.nodes.get(&path) {
            Some(Node::File(_)) => {
                inner.nodes.remove(&path);
                Ok(())
            }
            Some(Node::Directory) => Err(FsError::IsADirectory { op: "unlink", path }),
            None => Err(FsError::NotFound { op: "unlink", path }),
        }
    }

    async fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let path = Self::key(path);
        let inner = self.lock();
        match inner.nodes.get(&path) {
            Some(Node::File(data)) => Ok(Metadata {
                kind: EntryKind::File,
                size: data.len() as u64,
            }),
            Some(Node::Directory) => Ok(Metadata {
                kind: EntryKind::Directory,
                size: 0,
            }),
            None => Err(FsError::NotFound { op: "stat", path }),
        }
    }

    async fn flush(&self) -> Result<(), FsError> {
        self.lock().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_parent() {
        let fs = MemoryFs::new();
        let err = fs.write_file("/missing/a.txt", b"x").await.unwrap_err();
        assert!(err.is_not_found());
        fs.mkdir("/missing", false).await.unwrap();
        fs.write_file("/missing/a.txt", b"x").await.unwrap();
        assert_eq!(fs.read_file("/missing/a.txt").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn recursive_mkdir_is_idempotent() {
        let fs = MemoryFs::new();
        fs.mkdir("/a/b/c", true).await.unwrap();
        fs.mkdir("/a/b/c", true).await.unwrap();
        assert!(fs.stat("/a/b").await.unwrap().is_directory());
        let err = fs.mkdir("/a/b/c", false).await.unwrap_err();
        assert_eq!(err.code(), "EEXIST");
    }

    #[tokio::test]
    async fn readdir_lists_direct_children_only() {
        let fs = MemoryFs::with_files([("/a/x.txt", ""), ("/a/sub/y.txt", ""), ("/ab.txt", "")]);
        assert_eq!(fs.readdir("/a").await.unwrap(), vec!["sub", "x.txt"]);
        assert_eq!(fs.readdir("/").await.unwrap(), vec!["a", "ab.txt"]);
    }

    #[tokio::test]
    async fn relative_paths_are_rooted() {
        let fs = MemoryFs::new();
        fs.write_file("note.txt", b"hi").await.unwrap();
        assert_eq!(fs.read_to_string("/note.txt").await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn unlink_refuses_directories() {
        let fs = MemoryFs::with_files([("/d/f", "1")]);
        assert_eq!(fs.unlink("/d").await.unwrap_err().code(), "EISDIR");
        fs.unlink("/d/f").await.unwrap();
        assert!(!fs.exists("/d/f").await);
    }

    #[tokio::test]
    async fn injected_fault_hits_only_its_path() {
        let fs = MemoryFs::with_files([("/a", "1"), ("/b", "2")]);
        fs.fail_on(FailOn::Unlink("/a".into()));
        assert!(fs.unlink("/a").await.is_err());
        assert!(fs.unlink("/b").await.is_ok());
        fs.clear_failure();
        assert!(fs.unlink("/a").await.is_ok());
    }

    #[tokio::test]
    async fn one_shot_fault_clears_itself() {
        let fs = MemoryFs::with_files([("/a", "1")]);
        fs.fail_once(FailOn::Write("/a".into()));
        assert_eq!(fs.write_file("/a", b"2").await.unwrap_err().code(), "EIO");
        fs.write_file("/a", b"2").await.unwrap();
        assert_eq!(fs.read_file("/a").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn errors_use_errno_shape() {
        let fs = MemoryFs::new();
        let err = fs.read_file("/nope.txt").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "ENOENT: no such file or directory, open '/nope.txt'"
        );
    }

    #[tokio::test]
    async fn flush_is_counted() {
        let fs = MemoryFs::new();
        fs.flush().await.unwrap();
        fs.flush().await.unwrap();
        assert_eq!(fs.flush_count(), 2);
    }
}
