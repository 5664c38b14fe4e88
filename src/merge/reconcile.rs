//! merge::reconcile
//!
//! Working-directory reconciliation after a three-way merge.
//!
//! # Algorithm
//!
//! 1. Snapshot the file set of the working tree (excluding `.git`).
//! 2. Write every blob of the merged tree, notifying the sink per file.
//! 3. Delete every snapshot path absent from the merged tree, notifying the
//!    sink per file.
//!
//! All writes and their notifications happen before the first deletion.
//! A failing file operation is retried once, then logged and skipped; it
//! never aborts the pass.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::core::paths;
use crate::core::types::Oid;
use crate::git::{ObjectKind, VersionStore};
use crate::notify::{ChangeEvent, ChangeSink};
use crate::vfs::{self, Filesystem, FsError};

use super::outcome::MergeError;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Paths written, in tree order
    pub written: Vec<String>,
    /// Paths deleted
    pub deleted: Vec<String>,
    /// Paths skipped after a failure, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Make the working tree's file set and contents match `tree`.
///
/// # Errors
///
/// Fails only if the working tree or the tree object cannot be listed.
/// Per-file failures are reported in [`ReconcileReport::skipped`].
pub async fn reconcile<S>(
    store: &S,
    fs: &dyn Filesystem,
    sink: &dyn ChangeSink,
    tree: &Oid,
) -> Result<ReconcileReport, MergeError>
where
    S: VersionStore + ?Sized,
{
    let before = vfs::list_files(fs, "/").await.map_err(MergeError::failed)?;
    let entries = store.read_tree(tree).map_err(MergeError::failed)?;

    let mut report = ReconcileReport::default();
    let mut present = BTreeSet::new();

    for entry in entries.iter().filter(|e| e.kind == ObjectKind::Blob) {
        let path = format!("/{}", entry.path);
        present.insert(path.clone());

        let content = match store.read_blob(&entry.oid) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to read merged blob, skipping");
                report.skipped.push((path, e.to_string()));
                continue;
            }
        };

        let mut result = write_file(fs, &path, &content).await;
        if result.is_err() {
            debug!(path = %path, "retrying write");
            result = write_file(fs, &path, &content).await;
        }
        match result {
            Ok(()) => {
                let text = String::from_utf8_lossy(&content).into_owned();
                sink.notify(ChangeEvent::file(path.clone(), text)).await;
                report.written.push(path);
            }
            Err(e) => {
                warn!(path = %path, error = %e, "failed to write file, skipping");
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    for path in before.into_iter().filter(|p| !present.contains(p)) {
        let mut result = fs.unlink(&path).await;
        if matches!(&result, Err(e) if !e.is_not_found()) {
            debug!(path = %path, "retrying delete");
            result = fs.unlink(&path).await;
        }
        match result {
            Ok(()) => {
                sink.notify(ChangeEvent::delete(path.clone())).await;
                report.deleted.push(path);
            }
            Err(e) => {
                warn!(path = %path, error = %e, "failed to delete file, skipping");
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    Ok(report)
}

async fn write_file(fs: &dyn Filesystem, path: &str, content: &[u8]) -> Result<(), FsError> {
    fs.mkdir(&paths::dirname(path), true).await?;
    fs.write_file(path, content).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::MockStore;
    use crate::notify::{ChangeKind, RecordingSink};
    use crate::vfs::{FailOn, MemoryFs};

    fn tree_of(store: &MockStore, files: &[(&str, &str)]) -> Oid {
        let commit = store.commit("scratch", files);
        store.commit_tree(&commit).unwrap()
    }

    #[tokio::test]
    async fn adds_modifies_and_deletes() {
        let store = MockStore::new();
        let tree = tree_of(&store, &[("keep.txt", "new"), ("dir/added.txt", "a")]);
        let fs = MemoryFs::with_files([("/keep.txt", "old"), ("/stale.txt", "x")]);
        let sink = RecordingSink::new();

        let report = reconcile(&store, &fs, &sink, &tree).await.unwrap();

        assert_eq!(fs.file_paths(), vec!["/dir/added.txt", "/keep.txt"]);
        assert_eq!(fs.read_to_string("/keep.txt").await.unwrap(), "new");
        assert_eq!(report.deleted, vec!["/stale.txt"]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn all_writes_precede_deletes() {
        let store = MockStore::new();
        let tree = tree_of(&store, &[("b.txt", "1"), ("d.txt", "1")]);
        let fs = MemoryFs::with_files([("/a.txt", ""), ("/c.txt", "")]);
        let sink = RecordingSink::new();

        reconcile(&store, &fs, &sink, &tree).await.unwrap();

        let kinds: Vec<ChangeKind> = sink.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::File,
                ChangeKind::File,
                ChangeKind::Delete,
                ChangeKind::Delete
            ]
        );
        assert_eq!(sink.events()[0].content.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn git_metadata_is_never_deleted() {
        let store = MockStore::new();
        let tree = tree_of(&store, &[("a.txt", "1")]);
        let fs = MemoryFs::with_files([("/.git/HEAD", "ref"), ("/a.txt", "0")]);

        reconcile(&store, &fs, &RecordingSink::new(), &tree)
            .await
            .unwrap();
        assert!(fs.exists("/.git/HEAD").await);
    }

    #[tokio::test]
    async fn transient_fault_is_retried() {
        let store = MockStore::new();
        let tree = tree_of(&store, &[("a.txt", "1"), ("new.txt", "n")]);
        let fs = MemoryFs::with_files([("/a.txt", "0"), ("/old.txt", "")]);
        fs.fail_once(FailOn::Write("/new.txt".into()));

        let report = reconcile(&store, &fs, &RecordingSink::new(), &tree)
            .await
            .unwrap();

        assert!(report.skipped.is_empty());
        assert_eq!(fs.file_paths(), vec!["/a.txt", "/new.txt"]);
    }

    #[tokio::test]
    async fn persistent_fault_skips_one_file_only() {
        let store = MockStore::new();
        let tree = tree_of(&store, &[("a.txt", "1"), ("b.txt", "1")]);
        let fs = MemoryFs::with_files([("/a.txt", "0"), ("/b.txt", "0"), ("/c.txt", "")]);
        fs.fail_on(FailOn::Write("/a.txt".into()));
        let sink = RecordingSink::new();

        let report = reconcile(&store, &fs, &sink, &tree).await.unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "/a.txt");
        assert_eq!(fs.read_to_string("/b.txt").await.unwrap(), "1");
        // The file set still matches the tree
        assert_eq!(fs.file_paths(), vec!["/a.txt", "/b.txt"]);
        assert!(sink.events().iter().all(|e| e.path != "/a.txt"));
    }
}
