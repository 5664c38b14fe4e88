//! vfs::local
//!
//! Filesystem adapter over a real directory.
//!
//! Project paths (`/src/a.js`) are mapped under the root directory given at
//! construction. `..` segments are collapsed before mapping, so no project
//! path can escape the root.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::traits::{EntryKind, Filesystem, FsError, Metadata};
use crate::core::paths;

/// A [`Filesystem`] rooted at a host directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The host directory backing `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a project path onto the host filesystem.
    pub fn host_path(&self, path: &str) -> PathBuf {
        let normalized = paths::resolve_from("/", path);
        paths::components(&normalized)
            .into_iter()
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn map_err(err: io::Error, op: &'static str, path: &str) -> FsError {
        let path = paths::resolve_from("/", path);
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound { op, path },
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists { op, path },
            _ => FsError::Io {
                op,
                path,
                message: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let host = self.host_path(path);
        if tokio::fs::metadata(&host)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(FsError::IsADirectory {
                op: "read",
                path: paths::resolve_from("/", path),
            });
        }
        tokio::fs::read(&host)
            .await
            .map_err(|e| Self::map_err(e, "open", path))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        tokio::fs::write(self.host_path(path), data)
            .await
            .map_err(|e| Self::map_err(e, "open", path))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let host = self.host_path(path);
        let result = if recursive {
            tokio::fs::create_dir_all(&host).await
        } else {
            tokio::fs::create_dir(&host).await
        };
        result.map_err(|e| Self::map_err(e, "mkdir", path))
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let host = self.host_path(path);
        let meta = tokio::fs::metadata(&host)
            .await
            .map_err(|e| Self::map_err(e, "scandir", path))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory {
                op: "scandir",
                path: paths::resolve_from("/", path),
            });
        }
        let mut entries = tokio::fs::read_dir(&host)
            .await
            .map_err(|e| Self::map_err(e, "scandir", path))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_err(e, "scandir", path))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let host = self.host_path(path);
        let meta = tokio::fs::metadata(&host)
            .await
            .map_err(|e| Self::map_err(e, "unlink", path))?;
        if meta.is_dir() {
            return Err(FsError::IsADirectory {
                op: "unlink",
                path: paths::resolve_from("/", path),
            });
        }
        tokio::fs::remove_file(&host)
            .await
            .map_err(|e| Self::map_err(e, "unlink", path))
    }

    async fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let meta = tokio::fs::metadata(self.host_path(path))
            .await
            .map_err(|e| Self::map_err(e, "stat", path))?;
        Ok(Metadata {
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }
}
