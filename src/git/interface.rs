//! git::interface
//!
//! Version store implementation using git2.
//!
//! # Architecture
//!
//! The `Git` struct is the only way the crate touches a Git repository.
//! No other module imports `git2`. Errors from libgit2 are normalized into
//! [`GitError`] variants at this boundary, and every id leaving the module is
//! a validated [`Oid`].
//!
//! # Working tree
//!
//! libgit2 checks out against HEAD as its baseline. The merge engine moves
//! the branch ref *before* checking out, so [`Git::checkout`] removes files
//! tracked by the old index itself instead of relying on that baseline.
//!
//! # Example
//!
//! ```ignore
//! use pyxis::git::{Git, VersionStore};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let main = git.resolve_branch(&"main".try_into()?)?;
//! println!("main is at {}", main.unwrap().short(7));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{BranchName, Oid, TypeError};

use super::store::{MergeRequest, MergeResult, ObjectKind, StatusRow, TreeEntry, VersionStore};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// The three-way merge produced conflicting paths.
    #[error("merge conflict in {}", paths.join(", "))]
    MergeConflict {
        /// Paths with conflicting changes
        paths: Vec<String>,
    },

    /// Materializing a commit into the working tree failed.
    #[error("checkout failed: {message}")]
    Checkout {
        /// Description of the failure
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            git2::ErrorCode::Conflict => GitError::Checkout {
                message: format!("{}: {}", context, err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    /// Whether this error is a merge conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GitError::MergeConflict { .. })
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
        }
    }
}

/// The git2-backed version store.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository whose working directory is `path`.
    ///
    /// Unlike discovery, this does not walk up to parent directories: the
    /// project root *is* the working tree.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if `path` has no repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// The working directory root.
    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        Oid::new(oid.to_string()).map_err(|e| e.into())
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
        git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
    }

    fn from_raw(oid: git2::Oid) -> Result<Oid, GitError> {
        Oid::new(oid.to_string()).map_err(|e| e.into())
    }

    fn find_commit(&self, oid: &Oid) -> Result<git2::Commit<'_>, GitError> {
        self.repo
            .find_commit(Self::to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))
    }

    fn head_tree(&self) -> Result<Option<git2::Tree<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(
                head.peel_to_tree()
                    .map_err(|e| GitError::from_git2(e, "HEAD"))?,
            )),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(GitError::from_git2(e, "HEAD")),
        }
    }

    /// Blob paths and ids of a tree, keyed by path.
    fn tree_blobs(tree: &git2::Tree<'_>) -> Result<BTreeMap<String, git2::Oid>, GitError> {
        let mut blobs = BTreeMap::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    blobs.insert(format!("{root}{name}"), entry.id());
                }
            }
            git2::TreeWalkResult::Ok
        })
        .map_err(|e| GitError::from_git2(e, "tree walk"))?;
        Ok(blobs)
    }

    /// Stage-0 index entries, keyed by path.
    fn index_blobs(index: &git2::Index) -> BTreeMap<String, git2::Oid> {
        // Bits 12-13 of the entry flags hold the conflict stage.
        index
            .iter()
            .filter(|entry| (entry.flags >> 12) & 0x3 == 0)
            .map(|entry| (String::from_utf8_lossy(&entry.path).into_owned(), entry.id))
            .collect()
    }

    fn open_index(&self) -> Result<git2::Index, GitError> {
        let mut index = self.repo.index().map_err(|e| GitError::Internal {
            message: e.message().to_string(),
        })?;
        index.read(false).map_err(|e| GitError::from_git2(e, "index"))?;
        Ok(index)
    }

    /// Remove a working-tree file and any parent directories it leaves empty.
    fn remove_workdir_file(work_dir: &Path, path: &str) -> Result<(), GitError> {
        let full = work_dir.join(path);
        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(GitError::Checkout {
                    message: format!("failed to remove '{path}': {e}"),
                })
            }
        }
        let mut dir = full.parent();
        while let Some(d) = dir {
            if d == work_dir || std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }
}

impl VersionStore for Git {
    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }

        Ok(None) // Detached HEAD
    }

    fn head_oid(&self) -> Result<Option<Oid>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        let oid = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?
            .id();
        Ok(Some(Self::from_raw(oid)?))
    }

    fn list_branches(&self) -> Result<Vec<BranchName>, GitError> {
        let branches = self
            .repo
            .branches(Some(git2::BranchType::Local))
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })?;
            if let Some(name) = branch.name().ok().flatten() {
                // Skip invalid branch names
                if let Ok(branch_name) = BranchName::new(name) {
                    names.push(branch_name);
                }
            }
        }

        names.sort();
        Ok(names)
    }

    fn resolve_branch(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.try_resolve_ref(&branch.refname())
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        // A commit is its own ancestor
        if ancestor == descendant {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(Self::to_git2(descendant)?, Self::to_git2(ancestor)?)
            .map_err(|e| GitError::Internal {
                message: e.message().to_string(),
            })
    }

    fn commit_tree(&self, commit: &Oid) -> Result<Oid, GitError> {
        Self::from_raw(self.find_commit(commit)?.tree_id())
    }

    fn read_tree(&self, tree: &Oid) -> Result<Vec<TreeEntry>, GitError> {
        let tree = self
            .repo
            .find_tree(Self::to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let mut raw = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            let kind = match entry.kind() {
                Some(git2::ObjectType::Blob) => ObjectKind::Blob,
                Some(git2::ObjectType::Tree) => ObjectKind::Tree,
                // Submodule commits have no content to materialize
                _ => return git2::TreeWalkResult::Skip,
            };
            if let Some(name) = entry.name() {
                raw.push((format!("{root}{name}"), kind, entry.id()));
            }
            git2::TreeWalkResult::Ok
        })
        .map_err(|e| GitError::from_git2(e, "tree walk"))?;

        raw.into_iter()
            .map(|(path, kind, oid)| {
                Ok(TreeEntry {
                    path,
                    kind,
                    oid: Self::from_raw(oid)?,
                })
            })
            .collect()
    }

    fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>, GitError> {
        let found = self
            .repo
            .find_blob(Self::to_git2(blob)?)
            .map_err(|e| GitError::from_git2(e, blob.as_str()))?;
        Ok(found.content().to_vec())
    }

    fn checkout(&self, commit: &Oid, force: bool) -> Result<(), GitError> {
        let commit = self.find_commit(commit)?;
        let tree = commit
            .tree()
            .map_err(|e| GitError::from_git2(e, "commit tree"))?;
        let mut index = self.open_index()?;

        if force {
            let work_dir = self.work_dir()?.to_path_buf();
            let target = Self::tree_blobs(&tree)?;
            let stale: Vec<String> = Self::index_blobs(&index)
                .into_keys()
                .filter(|path| !target.contains_key(path))
                .collect();
            for path in stale {
                Self::remove_workdir_file(&work_dir, &path)?;
            }
        }

        let mut opts = git2::build::CheckoutBuilder::new();
        if force {
            opts.force();
        } else {
            opts.safe();
        }
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "checkout"))?;

        index
            .read_tree(&tree)
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))?;
        Ok(())
    }

    fn write_ref(&self, branch: &BranchName, commit: &Oid) -> Result<(), GitError> {
        let refname = branch.refname();
        self.repo
            .reference(
                &refname,
                Self::to_git2(commit)?,
                true,
                &format!("pyxis: move {} to {}", branch, commit.short(7)),
            )
            .map_err(|e| GitError::from_git2(e, &refname))?;
        Ok(())
    }

    fn merge(&self, request: &MergeRequest) -> Result<MergeResult, GitError> {
        let ours_oid = self.resolve_ref(&request.ours.refname())?;
        let theirs_oid = self.resolve_ref(&request.theirs.refname())?;

        if self.is_ancestor(&theirs_oid, &ours_oid)? {
            return Ok(MergeResult::AlreadyMerged);
        }

        let ours = self.find_commit(&ours_oid)?;
        let theirs = self.find_commit(&theirs_oid)?;

        let mut merged = self
            .repo
            .merge_commits(&ours, &theirs, None)
            .map_err(|e| GitError::from_git2(e, "merge"))?;

        if merged.has_conflicts() {
            let conflicts = merged
                .conflicts()
                .map_err(|e| GitError::from_git2(e, "merge conflicts"))?;
            let paths: BTreeSet<String> = conflicts
                .filter_map(Result::ok)
                .filter_map(|c| c.our.or(c.their).or(c.ancestor))
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect();
            return Err(GitError::MergeConflict {
                paths: paths.into_iter().collect(),
            });
        }

        let tree_oid = merged
            .write_tree_to(&self.repo)
            .map_err(|e| GitError::from_git2(e, "write tree"))?;
        let tree = self
            .repo
            .find_tree(tree_oid)
            .map_err(|e| GitError::from_git2(e, "merged tree"))?;

        let signature = git2::Signature::now(&request.identity.name, &request.identity.email)
            .map_err(|e| GitError::from_git2(e, "signature"))?;
        let commit_oid = self
            .repo
            .commit(
                None,
                &signature,
                &signature,
                &request.message,
                &tree,
                &[&ours, &theirs],
            )
            .map_err(|e| GitError::from_git2(e, "commit"))?;

        let ours_ref = request.ours.refname();
        self.repo
            .reference(
                &ours_ref,
                commit_oid,
                true,
                &format!("merge {}: Merge made by the 'ort' strategy.", request.theirs),
            )
            .map_err(|e| GitError::from_git2(e, &ours_ref))?;

        let mut index = self.open_index()?;
        index
            .read_tree(&tree)
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))?;

        Ok(MergeResult::Merged {
            commit: Self::from_raw(commit_oid)?,
            tree: Self::from_raw(tree_oid)?,
        })
    }

    fn status_matrix(&self) -> Result<Vec<StatusRow>, GitError> {
        let work_dir = self.work_dir()?;
        let head = match self.head_tree()? {
            Some(tree) => Self::tree_blobs(&tree)?,
            None => BTreeMap::new(),
        };
        let index = Self::index_blobs(&self.open_index()?);

        let tracked: BTreeSet<&String> = head.keys().chain(index.keys()).collect();
        let mut rows = Vec::with_capacity(tracked.len());
        for path in tracked {
            let full = work_dir.join(path);
            let workdir = if full.is_file() {
                Some(
                    git2::Oid::hash_file(git2::ObjectType::Blob, &full)
                        .map_err(|e| GitError::from_git2(e, path))?,
                )
            } else {
                None
            };
            rows.push(StatusRow {
                path: path.clone(),
                head: head.get(path).copied().map(Self::from_raw).transpose()?,
                index: index.get(path).copied().map(Self::from_raw).transpose()?,
                workdir: workdir.map(Self::from_raw).transpose()?,
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        #[test]
        fn conflict_lists_paths() {
            let err = GitError::MergeConflict {
                paths: vec!["a.txt".to_string(), "src/b.js".to_string()],
            };
            assert!(err.is_conflict());
            assert_eq!(err.to_string(), "merge conflict in a.txt, src/b.js");
        }

        #[test]
        fn type_errors_convert() {
            let err: GitError = TypeError::InvalidOid("zz".into()).into();
            assert!(matches!(err, GitError::InvalidOid { .. }));
            let err: GitError = TypeError::InvalidBranchName("a..b".into()).into();
            assert!(matches!(err, GitError::InvalidRefName { .. }));
        }

        #[test]
        fn checkout_display() {
            let err = GitError::Checkout {
                message: "1 conflict prevents checkout".to_string(),
            };
            assert!(err.to_string().starts_with("checkout failed"));
            assert!(!err.is_conflict());
        }
    }

    mod open {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn non_repository_fails() {
            let dir = TempDir::new().unwrap();
            assert!(matches!(
                Git::open(dir.path()),
                Err(GitError::NotARepo { .. })
            ));
        }

        #[test]
        fn fresh_repository_has_no_head() {
            let dir = TempDir::new().unwrap();
            git2::Repository::init(dir.path()).unwrap();
            let git = Git::open(dir.path()).unwrap();
            assert_eq!(git.head_oid().unwrap(), None);
            assert_eq!(git.current_branch().unwrap(), None);
            assert!(git.status_matrix().unwrap().is_empty());
        }
    }
}
