//! git::mock
//!
//! In-memory version store for deterministic testing.
//!
//! # Design
//!
//! Commits are full snapshots (path to content). Ids are derived from
//! content with SHA-256, so identical snapshots share a tree id. The
//! three-way merge is per file: a path changed on one side only takes that
//! side, a path changed identically on both sides is kept, anything else
//! is a conflict.
//!
//! The store does not own a working tree: `checkout` only records the call
//! and moves the index. Working-tree state for `status_matrix` is
//! configured directly with [`MockStore::modify_workdir`].
//!
//! # Example
//!
//! ```
//! use pyxis::git::mock::MockStore;
//! use pyxis::git::VersionStore;
//!
//! let store = MockStore::new();
//! let base = store.commit("main", &[("a.txt", "1")]);
//! store.create_branch("feature", "main");
//! let tip = store.commit("feature", &[("a.txt", "2")]);
//!
//! assert!(store.is_ancestor(&base, &tip).unwrap());
//! assert_eq!(store.current_branch().unwrap().unwrap().as_str(), "main");
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::core::types::{BranchName, Oid};

use super::store::{MergeRequest, MergeResult, ObjectKind, StatusRow, TreeEntry, VersionStore};
use super::GitError;

/// Which operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Checkout,
    Merge,
    StatusMatrix,
    WriteRef,
}

/// Recorded mutation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    WriteRef { branch: String, commit: Oid },
    Checkout { commit: Oid, force: bool },
    Merge { ours: String, theirs: String, message: String },
}

#[derive(Debug, Clone)]
struct Commit {
    parents: Vec<Oid>,
    tree: Oid,
}

type Snapshot = BTreeMap<String, Oid>;

#[derive(Debug, Default)]
struct MockStoreInner {
    commits: HashMap<Oid, Commit>,
    trees: HashMap<Oid, Snapshot>,
    blobs: HashMap<Oid, Vec<u8>>,
    branches: BTreeMap<String, Oid>,
    head: Option<String>,
    index: Snapshot,
    workdir_overrides: BTreeMap<String, Option<Oid>>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
    counter: u64,
}

/// Mock version store. Clones share state.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_id(kind: &str, data: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(data);
    let digest = hex::encode(hasher.finalize());
    Oid::new(&digest[..40]).expect("hex digest prefix is a valid object id")
}

impl MockStore {
    /// An empty store with HEAD on an unborn `main`.
    pub fn new() -> Self {
        let inner = MockStoreInner {
            head: Some("main".to_string()),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Commit a full snapshot on `branch` (created if missing).
    ///
    /// When `branch` is the current branch, the index follows.
    pub fn commit(&self, branch: &str, files: &[(&str, &str)]) -> Oid {
        let mut inner = self.lock();
        let snapshot: Snapshot = files
            .iter()
            .map(|(path, content)| {
                let oid = hash_id("blob", content.as_bytes());
                inner.blobs.insert(oid.clone(), content.as_bytes().to_vec());
                (path.to_string(), oid)
            })
            .collect();
        let parents = inner.branches.get(branch).cloned().into_iter().collect();
        let commit = Self::store_commit(&mut inner, parents, snapshot.clone());
        inner.branches.insert(branch.to_string(), commit.clone());
        if inner.head.as_deref() == Some(branch) {
            inner.index = snapshot;
        }
        commit
    }

    fn store_commit(inner: &mut MockStoreInner, parents: Vec<Oid>, snapshot: Snapshot) -> Oid {
        let tree_text: String = snapshot
            .iter()
            .map(|(path, oid)| format!("{path} {oid}\n"))
            .collect();
        let tree = hash_id("tree", tree_text.as_bytes());
        inner.trees.insert(tree.clone(), snapshot);

        inner.counter += 1;
        let parent_text: Vec<&str> = parents.iter().map(Oid::as_str).collect();
        let commit_text = format!("{tree}\n{}\n{}", parent_text.join(" "), inner.counter);
        let commit = hash_id("commit", commit_text.as_bytes());
        inner.commits.insert(commit.clone(), Commit { parents, tree });
        commit
    }

    /// Create `name` pointing where `from` points.
    pub fn create_branch(&self, name: &str, from: &str) {
        let mut inner = self.lock();
        if let Some(oid) = inner.branches.get(from).cloned() {
            inner.branches.insert(name.to_string(), oid);
        }
    }

    /// Point HEAD at a branch and reset the index to its tree.
    pub fn switch(&self, branch: &str) {
        let mut inner = self.lock();
        inner.head = Some(branch.to_string());
        let snapshot = inner
            .branches
            .get(branch)
            .and_then(|c| inner.commits.get(c))
            .and_then(|c| inner.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();
        inner.index = snapshot;
    }

    /// Detach HEAD.
    pub fn detach(&self) {
        self.lock().head = None;
    }

    /// Pretend the working copy of `path` has `content` (`None` = deleted).
    pub fn modify_workdir(&self, path: &str, content: Option<&str>) {
        let oid = content.map(|c| hash_id("blob", c.as_bytes()));
        self.lock().workdir_overrides.insert(path.to_string(), oid);
    }

    /// Stage `content` for `path` in the index.
    pub fn stage(&self, path: &str, content: &str) {
        let oid = hash_id("blob", content.as_bytes());
        let mut inner = self.lock();
        inner.blobs.insert(oid.clone(), content.as_bytes().to_vec());
        inner.index.insert(path.to_string(), oid);
    }

    /// Make an operation fail until cleared.
    pub fn fail_on(&self, fail: FailOn) {
        self.lock().fail_on = Some(fail);
    }

    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    /// Every mutation made so far, in order.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Tip of a branch.
    pub fn tip(&self, branch: &str) -> Option<Oid> {
        self.lock().branches.get(branch).cloned()
    }

    /// Parents of a commit.
    pub fn parents(&self, commit: &Oid) -> Vec<Oid> {
        self.lock()
            .commits
            .get(commit)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    /// File contents of a commit, keyed by path.
    pub fn files_at(&self, commit: &Oid) -> BTreeMap<String, String> {
        let inner = self.lock();
        let Some(snapshot) = inner
            .commits
            .get(commit)
            .and_then(|c| inner.trees.get(&c.tree))
        else {
            return BTreeMap::new();
        };
        snapshot
            .iter()
            .filter_map(|(path, oid)| {
                let bytes = inner.blobs.get(oid)?;
                Some((path.clone(), String::from_utf8_lossy(bytes).into_owned()))
            })
            .collect()
    }

    fn check_fault(inner: &MockStoreInner, op: FailOn) -> Result<(), GitError> {
        if inner.fail_on == Some(op) {
            return Err(GitError::Internal {
                message: format!("injected {op:?} failure"),
            });
        }
        Ok(())
    }

    fn ancestors(inner: &MockStoreInner, start: &Oid) -> BTreeSet<Oid> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![start.clone()];
        while let Some(oid) = pending.pop() {
            if !seen.insert(oid.clone()) {
                continue;
            }
            if let Some(commit) = inner.commits.get(&oid) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn merge_base(inner: &MockStoreInner, a: &Oid, b: &Oid) -> Option<Oid> {
        let of_a = Self::ancestors(inner, a);
        // Breadth-first from b finds a nearest common ancestor
        let mut queue = std::collections::VecDeque::from([b.clone()]);
        let mut seen = BTreeSet::new();
        while let Some(oid) = queue.pop_front() {
            if of_a.contains(&oid) {
                return Some(oid);
            }
            if !seen.insert(oid.clone()) {
                continue;
            }
            if let Some(commit) = inner.commits.get(&oid) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        None
    }

    fn snapshot_of(inner: &MockStoreInner, commit: &Oid) -> Result<Snapshot, GitError> {
        inner
            .commits
            .get(commit)
            .and_then(|c| inner.trees.get(&c.tree))
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound {
                oid: commit.to_string(),
            })
    }

    fn resolve(inner: &MockStoreInner, branch: &BranchName) -> Result<Oid, GitError> {
        inner
            .branches
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| GitError::RefNotFound {
                refname: branch.refname(),
            })
    }
}

impl VersionStore for MockStore {
    fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let inner = self.lock();
        match &inner.head {
            Some(name) if inner.branches.contains_key(name) => Ok(Some(BranchName::new(name)?)),
            _ => Ok(None),
        }
    }

    fn head_oid(&self) -> Result<Option<Oid>, GitError> {
        let inner = self.lock();
        Ok(inner
            .head
            .as_ref()
            .and_then(|name| inner.branches.get(name))
            .cloned())
    }

    fn list_branches(&self) -> Result<Vec<BranchName>, GitError> {
        self.lock()
            .branches
            .keys()
            .map(|name| BranchName::new(name).map_err(GitError::from))
            .collect()
    }

    fn resolve_branch(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        Ok(self.lock().branches.get(branch.as_str()).cloned())
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        let inner = self.lock();
        Ok(Self::ancestors(&inner, descendant).contains(ancestor))
    }

    fn commit_tree(&self, commit: &Oid) -> Result<Oid, GitError> {
        self.lock()
            .commits
            .get(commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| GitError::ObjectNotFound {
                oid: commit.to_string(),
            })
    }

    fn read_tree(&self, tree: &Oid) -> Result<Vec<TreeEntry>, GitError> {
        let inner = self.lock();
        let snapshot = inner.trees.get(tree).ok_or_else(|| GitError::ObjectNotFound {
            oid: tree.to_string(),
        })?;

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for (path, oid) in snapshot {
            let parts: Vec<&str> = path.split('/').collect();
            for depth in 1..parts.len() {
                let dir = parts[..depth].join("/");
                if dirs.insert(dir.clone()) {
                    entries.push(TreeEntry {
                        oid: hash_id("tree", dir.as_bytes()),
                        path: dir,
                        kind: ObjectKind::Tree,
                    });
                }
            }
            entries.push(TreeEntry {
                path: path.clone(),
                kind: ObjectKind::Blob,
                oid: oid.clone(),
            });
        }
        Ok(entries)
    }

    fn read_blob(&self, blob: &Oid) -> Result<Vec<u8>, GitError> {
        self.lock()
            .blobs
            .get(blob)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound {
                oid: blob.to_string(),
            })
    }

    fn checkout(&self, commit: &Oid, force: bool) -> Result<(), GitError> {
        let mut inner = self.lock();
        Self::check_fault(&inner, FailOn::Checkout)?;
        let snapshot = Self::snapshot_of(&inner, commit)?;
        inner.index = snapshot;
        if force {
            inner.workdir_overrides.clear();
        }
        inner.operations.push(MockOperation::Checkout {
            commit: commit.clone(),
            force,
        });
        Ok(())
    }

    fn write_ref(&self, branch: &BranchName, commit: &Oid) -> Result<(), GitError> {
        let mut inner = self.lock();
        Self::check_fault(&inner, FailOn::WriteRef)?;
        inner
            .branches
            .insert(branch.as_str().to_string(), commit.clone());
        inner.operations.push(MockOperation::WriteRef {
            branch: branch.as_str().to_string(),
            commit: commit.clone(),
        });
        Ok(())
    }

    fn merge(&self, request: &MergeRequest) -> Result<MergeResult, GitError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Merge {
            ours: request.ours.as_str().to_string(),
            theirs: request.theirs.as_str().to_string(),
            message: request.message.clone(),
        });
        Self::check_fault(&inner, FailOn::Merge)?;

        let ours = Self::resolve(&inner, &request.ours)?;
        let theirs = Self::resolve(&inner, &request.theirs)?;
        if Self::ancestors(&inner, &ours).contains(&theirs) {
            return Ok(MergeResult::AlreadyMerged);
        }

        let base = match Self::merge_base(&inner, &ours, &theirs) {
            Some(b) => Self::snapshot_of(&inner, &b)?,
            None => Snapshot::new(),
        };
        let ours_files = Self::snapshot_of(&inner, &ours)?;
        let theirs_files = Self::snapshot_of(&inner, &theirs)?;

        let paths: BTreeSet<&String> = base
            .keys()
            .chain(ours_files.keys())
            .chain(theirs_files.keys())
            .collect();
        let mut merged = Snapshot::new();
        let mut conflicts = Vec::new();
        for path in paths {
            let (b, o, t) = (base.get(path), ours_files.get(path), theirs_files.get(path));
            let pick = if o == t || t == b {
                o
            } else if o == b {
                t
            } else {
                conflicts.push(path.clone());
                continue;
            };
            if let Some(oid) = pick {
                merged.insert(path.clone(), oid.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(GitError::MergeConflict { paths: conflicts });
        }

        let commit = Self::store_commit(&mut inner, vec![ours.clone(), theirs], merged.clone());
        inner
            .branches
            .insert(request.ours.as_str().to_string(), commit.clone());
        inner.index = merged;
        let tree = inner
            .commits
            .get(&commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| GitError::ObjectNotFound {
                oid: commit.to_string(),
            })?;
        Ok(MergeResult::Merged { commit, tree })
    }

    fn status_matrix(&self) -> Result<Vec<StatusRow>, GitError> {
        let inner = self.lock();
        Self::check_fault(&inner, FailOn::StatusMatrix)?;
        let head = match inner.head.as_ref().and_then(|h| inner.branches.get(h)) {
            Some(commit) => Self::snapshot_of(&inner, commit)?,
            None => Snapshot::new(),
        };
        let tracked: BTreeSet<&String> = head.keys().chain(inner.index.keys()).collect();
        Ok(tracked
            .into_iter()
            .map(|path| {
                let index = inner.index.get(path).cloned();
                let workdir = match inner.workdir_overrides.get(path) {
                    Some(over) => over.clone(),
                    None => index.clone(),
                };
                StatusRow {
                    path: path.clone(),
                    head: head.get(path).cloned(),
                    index,
                    workdir,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn request(ours: &str, theirs: &str) -> MergeRequest {
        MergeRequest {
            ours: branch(ours),
            theirs: branch(theirs),
            message: format!("Merge branch '{theirs}' into {ours}"),
            identity: super::super::Identity::merge_bot(),
        }
    }

    #[test]
    fn identical_content_shares_blob_ids() {
        let store = MockStore::new();
        let a = store.commit("main", &[("x", "same"), ("y", "same")]);
        let rows = store.status_matrix().unwrap();
        assert_eq!(rows[0].head, rows[1].head);
        assert!(store.parents(&a).is_empty());
    }

    #[test]
    fn three_way_merges_disjoint_changes() {
        let store = MockStore::new();
        store.commit("main", &[("a", "1"), ("b", "1")]);
        store.create_branch("feature", "main");
        store.commit("feature", &[("a", "1"), ("b", "2"), ("c", "new")]);
        let ours = store.commit("main", &[("a", "9"), ("b", "1")]);

        let result = store.merge(&request("main", "feature")).unwrap();
        let MergeResult::Merged { commit, .. } = result else {
            panic!("expected merge commit");
        };
        assert_eq!(store.parents(&commit)[0], ours);
        let files = store.files_at(&commit);
        assert_eq!(files["a"], "9");
        assert_eq!(files["b"], "2");
        assert_eq!(files["c"], "new");
        assert_eq!(store.tip("main"), Some(commit));
    }

    #[test]
    fn deletions_propagate() {
        let store = MockStore::new();
        store.commit("main", &[("a", "1"), ("gone", "x")]);
        store.create_branch("feature", "main");
        store.commit("feature", &[("a", "1")]);
        store.commit("main", &[("a", "1"), ("gone", "x"), ("m", "1")]);

        let MergeResult::Merged { commit, .. } = store.merge(&request("main", "feature")).unwrap()
        else {
            panic!("expected merge commit");
        };
        let files = store.files_at(&commit);
        assert!(!files.contains_key("gone"));
        assert!(files.contains_key("m"));
    }

    #[test]
    fn divergent_edits_conflict() {
        let store = MockStore::new();
        store.commit("main", &[("a", "base")]);
        store.create_branch("feature", "main");
        store.commit("feature", &[("a", "theirs")]);
        store.commit("main", &[("a", "ours")]);

        let err = store.merge(&request("main", "feature")).unwrap_err();
        assert!(matches!(err, GitError::MergeConflict { ref paths } if paths == &["a"]));
    }

    #[test]
    fn merged_ancestor_is_already_merged() {
        let store = MockStore::new();
        store.commit("main", &[("a", "1")]);
        store.create_branch("old", "main");
        store.commit("main", &[("a", "2")]);
        assert_eq!(
            store.merge(&request("main", "old")).unwrap(),
            MergeResult::AlreadyMerged
        );
    }

    #[test]
    fn workdir_overrides_make_rows_dirty() {
        let store = MockStore::new();
        store.commit("main", &[("a", "1"), ("b", "1")]);
        store.modify_workdir("b", Some("changed"));
        let dirty: Vec<_> = store
            .status_matrix()
            .unwrap()
            .into_iter()
            .filter(|r| !r.is_clean())
            .map(|r| r.path)
            .collect();
        assert_eq!(dirty, vec!["b"]);
    }

    #[test]
    fn read_tree_includes_directories() {
        let store = MockStore::new();
        let commit = store.commit("main", &[("src/lib/a.js", ""), ("README", "")]);
        let tree = store.commit_tree(&commit).unwrap();
        let entries = store.read_tree(&tree).unwrap();
        let trees: Vec<_> = entries
            .iter()
            .filter(|e| e.kind == ObjectKind::Tree)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(trees, vec!["src", "src/lib"]);
    }

    #[test]
    fn injected_failure() {
        let store = MockStore::new();
        let c = store.commit("main", &[("a", "1")]);
        store.fail_on(FailOn::Checkout);
        assert!(store.checkout(&c, true).is_err());
        store.clear_failure();
        assert!(store.checkout(&c, true).is_ok());
    }
}
