//! git::store
//!
//! The Version Store contract the merge engine is written against.
//!
//! The engine never talks to `git2` (or any other object database)
//! directly; it sees only this trait. [`super::Git`] is the production
//! implementation. Tests substitute scripted stores.

use std::fmt;

use crate::core::types::{BranchName, Oid};

use super::GitError;

/// Author/committer identity attached to merge commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// The fixed identity used for every merge commit.
    pub fn merge_bot() -> Self {
        Self {
            name: "User".to_string(),
            email: "user@pyxis.dev".to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
}

/// One entry from a recursive tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Slash-separated path relative to the repository root
    pub path: String,
    pub kind: ObjectKind,
    pub oid: Oid,
}

/// HEAD / index / working-tree content ids for one tracked path.
///
/// `None` means the path is absent from that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub path: String,
    pub head: Option<Oid>,
    pub index: Option<Oid>,
    pub workdir: Option<Oid>,
}

impl StatusRow {
    /// Whether HEAD, index and working tree all agree.
    pub fn is_clean(&self) -> bool {
        self.head == self.workdir && self.index == self.head
    }
}

/// Input to the three-way merge primitive.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub ours: BranchName,
    pub theirs: BranchName,
    pub message: String,
    pub identity: Identity,
}

/// Non-conflicting outcomes of the three-way merge primitive.
///
/// Conflicts are reported as [`GitError::MergeConflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// `theirs` is already reachable from `ours`.
    AlreadyMerged,
    /// A merge commit was created and `ours` moved to it.
    Merged { commit: Oid, tree: Oid },
}

/// Content-addressed history with refs, checkout and a three-way merge.
pub trait VersionStore {
    /// The branch HEAD points at, or `None` when detached or unborn.
    fn current_branch(&self) -> Result<Option<BranchName>, GitError>;

    /// The commit HEAD resolves to, if any.
    fn head_oid(&self) -> Result<Option<Oid>, GitError>;

    /// All local branches.
    fn list_branches(&self) -> Result<Vec<BranchName>, GitError>;

    /// The commit a branch points at, or `None` if the branch does not exist.
    fn resolve_branch(&self, branch: &BranchName) -> Result<Option<Oid>, GitError>;

    /// Whether `ancestor` is reachable from `descendant` (a commit is its
    /// own ancestor).
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError>;

    /// The tree id of a commit.
    fn commit_tree(&self, commit: &Oid) -> Result<Oid, GitError>;

    /// Every entry below a tree, depth-first.
    fn read_tree(&self, tree: &Oid) -> Result<Vec<TreeEntry>, GitError>;

    /// Raw blob content.
    fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>, GitError>;

    /// Materialize a commit into the working tree and index.
    ///
    /// With `force`, local modifications are discarded and files tracked in
    /// the old index but absent from the commit are removed.
    fn checkout(&self, commit: &Oid, force: bool) -> Result<(), GitError>;

    /// Point a branch at a commit.
    fn write_ref(&self, branch: &BranchName, commit: &Oid) -> Result<(), GitError>;

    /// Three-way merge `theirs` into `ours`.
    ///
    /// On success the merge commit is recorded, `ours` is moved to it and
    /// the index matches the merged tree. The working tree is left alone.
    fn merge(&self, request: &MergeRequest) -> Result<MergeResult, GitError>;

    /// One row per tracked path (present in HEAD or the index), sorted.
    fn status_matrix(&self) -> Result<Vec<StatusRow>, GitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn clean_row_requires_all_three_equal() {
        let row = StatusRow {
            path: "a.txt".into(),
            head: Some(oid('a')),
            index: Some(oid('a')),
            workdir: Some(oid('a')),
        };
        assert!(row.is_clean());

        let modified = StatusRow {
            workdir: Some(oid('b')),
            ..row.clone()
        };
        assert!(!modified.is_clean());

        let staged = StatusRow {
            index: Some(oid('b')),
            workdir: Some(oid('b')),
            ..row.clone()
        };
        assert!(!staged.is_clean());

        let deleted = StatusRow {
            workdir: None,
            ..row
        };
        assert!(!deleted.is_clean());
    }

    #[test]
    fn merge_identity_is_fixed() {
        assert_eq!(Identity::merge_bot().to_string(), "User <user@pyxis.dev>");
    }
}
