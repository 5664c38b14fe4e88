//! vfs::traits
//!
//! The filesystem adapter contract consumed by the merge engine and the
//! module runtime.
//!
//! # Design
//!
//! The trait is async because every filesystem call is a suspension point.
//! Paths are POSIX strings rooted at the project directory; relative paths
//! are interpreted from `/`. Implementations must be `Send + Sync` so one
//! adapter can be shared between both engines.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from filesystem operations.
///
/// Messages follow the errno-like shape callers expect from a server-side
/// runtime (`ENOENT: no such file or directory, open '/a.txt'`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, {op} '{path}'")]
    NotFound { op: &'static str, path: String },

    #[error("ENOTDIR: not a directory, {op} '{path}'")]
    NotADirectory { op: &'static str, path: String },

    #[error("EISDIR: illegal operation on a directory, {op} '{path}'")]
    IsADirectory { op: &'static str, path: String },

    #[error("EEXIST: file already exists, {op} '{path}'")]
    AlreadyExists { op: &'static str, path: String },

    #[error("EIO: {message}, {op} '{path}'")]
    Io {
        op: &'static str,
        path: String,
        message: String,
    },

    /// Fault injected by a test double.
    #[error("EIO: injected fault, {op} '{path}'")]
    Injected { op: &'static str, path: String },
}

impl FsError {
    /// The errno-style code (`ENOENT`, `EISDIR`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            FsError::NotFound { .. } => "ENOENT",
            FsError::NotADirectory { .. } => "ENOTDIR",
            FsError::IsADirectory { .. } => "EISDIR",
            FsError::AlreadyExists { .. } => "EEXIST",
            FsError::Io { .. } | FsError::Injected { .. } => "EIO",
        }
    }

    /// The path the failing operation was applied to.
    pub fn path(&self) -> &str {
        match self {
            FsError::NotFound { path, .. }
            | FsError::NotADirectory { path, .. }
            | FsError::IsADirectory { path, .. }
            | FsError::AlreadyExists { path, .. }
            | FsError::Io { path, .. }
            | FsError::Injected { path, .. } => path,
        }
    }

    /// Whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of [`Filesystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

impl Metadata {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Hierarchical byte store keyed by absolute project path.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Read a whole file.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Write a whole file, replacing any previous content.
    ///
    /// The parent directory must already exist.
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Create a directory; with `recursive`, missing parents are created and
    /// an existing directory is not an error.
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError>;

    /// Names of the entries in a directory, sorted.
    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError>;

    /// Remove a file.
    async fn unlink(&self, path: &str) -> Result<(), FsError>;

    /// Describe an entry.
    async fn stat(&self, path: &str) -> Result<Metadata, FsError>;

    /// Push buffered state to the backing store so later reads and other
    /// observers see every completed mutation.
    async fn flush(&self) -> Result<(), FsError> {
        Ok(())
    }

    /// Read a file and decode it as UTF-8 (lossily).
    async fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        let bytes = self.read_file(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Whether an entry exists at `path`.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }
}
