//! merge::engine
//!
//! The merge engine: `git merge` semantics over a [`VersionStore`] and a
//! [`Filesystem`].
//!
//! # Preconditions
//!
//! Checked in order by [`MergeEngine::merge`]; none of them mutate anything:
//!
//! 1. `/.git` exists, else [`MergeError::NotARepository`]
//! 2. Every tracked path agrees between HEAD, index and working tree
//! 3. The current branch is resolved (falling back to a configured name)
//! 4. Merging the current branch into itself is already up to date
//! 5. The target must be an existing branch
//!
//! # Concurrency
//!
//! One invocation runs to completion. Overlapping calls on the same project
//! must be serialized by the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::MergeSettings;
use crate::core::types::{BranchName, Oid};
use crate::git::{GitError, Identity, MergeRequest, MergeResult, VersionStore};
use crate::notify::{ChangeEvent, ChangeSink};
use crate::vfs::Filesystem;

use super::outcome::{MergeError, MergeOptions, MergeOutcome};
use super::reconcile::reconcile;

/// In-progress merge marker.
pub const MERGE_HEAD: &str = "/.git/MERGE_HEAD";
/// Message file written alongside [`MERGE_HEAD`].
pub const MERGE_MSG: &str = "/.git/MERGE_MSG";

/// Branch name reported when the version store itself errors.
const NO_GIT: &str = "(no git)";

/// Orchestrates merges for one project.
pub struct MergeEngine<S> {
    store: S,
    fs: Arc<dyn Filesystem>,
    sink: Arc<dyn ChangeSink>,
    settings: MergeSettings,
}

impl<S: VersionStore> MergeEngine<S> {
    pub fn new(store: S, fs: Arc<dyn Filesystem>, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            store,
            fs,
            sink,
            settings: MergeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: MergeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn ensure_repository(&self) -> Result<(), MergeError> {
        match self.fs.stat("/.git").await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(MergeError::NotARepository),
            Err(e) => Err(MergeError::Filesystem(e)),
        }
    }

    /// Tracked paths whose HEAD, index and working-tree contents disagree.
    ///
    /// A store that cannot compute status is treated as clean.
    fn dirty_paths(&self) -> Vec<String> {
        match self.store.status_matrix() {
            Ok(rows) => rows
                .into_iter()
                .filter(|row| !row.is_clean())
                .map(|row| row.path)
                .collect(),
            Err(e) => {
                warn!(error = %e, "status check failed, treating working tree as clean");
                Vec::new()
            }
        }
    }

    fn current_branch_name(&self) -> String {
        match self.store.current_branch() {
            Ok(Some(branch)) => branch.to_string(),
            Ok(None) => self.settings.fallback_branch.clone(),
            Err(e) => {
                warn!(error = %e, "could not resolve current branch");
                NO_GIT.to_string()
            }
        }
    }

    /// Merge `branch` into the current branch.
    ///
    /// # Errors
    ///
    /// - [`MergeError::NotARepository`] if `/.git` is missing
    /// - [`MergeError::Failed`] if the version store fails mid-merge
    ///
    /// Dirty trees, unknown branches, conflicts and no-op merges are
    /// returned as [`MergeOutcome`]s.
    pub async fn merge(
        &self,
        branch: &str,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, MergeError> {
        self.ensure_repository().await?;

        let dirty = self.dirty_paths();
        if !dirty.is_empty() {
            debug!(count = dirty.len(), "refusing to merge over local changes");
            return Ok(MergeOutcome::dirty(dirty));
        }

        let current = self.current_branch_name();
        if current == branch {
            return Ok(MergeOutcome::up_to_date());
        }

        let target = match BranchName::new(branch) {
            Ok(name) => match self.store.resolve_branch(&name) {
                Ok(Some(oid)) => Some((name, oid)),
                Ok(None) => None,
                Err(e) => {
                    debug!(branch, error = %e, "target branch did not resolve");
                    None
                }
            },
            Err(_) => None,
        };
        let Some((theirs, theirs_oid)) = target else {
            let available: Vec<String> = self
                .store
                .list_branches()
                .map_err(MergeError::failed)?
                .into_iter()
                .map(String::from)
                .collect();
            return Ok(MergeOutcome::unknown_branch(branch, &available));
        };

        let ff_error =
            |e: GitError| MergeError::failed(format!("Failed to check fast-forward possibility: {e}"));
        let (ours, ours_oid) = self.resolve_ours(&current).map_err(ff_error)?;
        let can_ff = ours_oid != theirs_oid
            && self
                .store
                .is_ancestor(&ours_oid, &theirs_oid)
                .map_err(ff_error)?;

        if can_ff && !options.no_ff {
            info!(ours = %ours, theirs = %theirs, "performing fast-forward merge");
            self.store
                .write_ref(&ours, &theirs_oid)
                .map_err(MergeError::failed)?;
            self.store
                .checkout(&theirs_oid, true)
                .map_err(MergeError::failed)?;
            self.sink.notify(ChangeEvent::whole_tree()).await;
            return Ok(MergeOutcome::fast_forward(&ours_oid, &theirs_oid));
        }

        info!(ours = %ours, theirs = %theirs, "performing three-way merge");
        let request = MergeRequest {
            message: options
                .message
                .clone()
                .unwrap_or_else(|| format!("Merge branch '{theirs}' into {ours}")),
            ours,
            theirs,
            identity: Identity::merge_bot(),
        };

        match self.store.merge(&request) {
            Ok(MergeResult::AlreadyMerged) => Ok(MergeOutcome::up_to_date()),
            Ok(MergeResult::Merged { commit, tree }) => {
                let report = reconcile(&self.store, self.fs.as_ref(), self.sink.as_ref(), &tree)
                    .await?;
                debug!(
                    written = report.written.len(),
                    deleted = report.deleted.len(),
                    skipped = report.skipped.len(),
                    "working tree reconciled"
                );
                self.sink.notify(ChangeEvent::whole_tree()).await;
                Ok(MergeOutcome::merged(&commit))
            }
            Err(GitError::MergeConflict { paths }) => {
                info!(count = paths.len(), "merge stopped on conflicts");
                Ok(MergeOutcome::conflict(paths))
            }
            Err(e) => Err(MergeError::failed(format!("Merge failed: {e}"))),
        }
    }

    fn resolve_ours(&self, current: &str) -> Result<(BranchName, Oid), GitError> {
        let ours = BranchName::new(current)?;
        let oid = self
            .store
            .resolve_branch(&ours)?
            .ok_or_else(|| GitError::RefNotFound {
                refname: ours.refname(),
            })?;
        Ok((ours, oid))
    }

    /// Abandon an in-progress merge and reset the working tree to HEAD.
    ///
    /// # Errors
    ///
    /// - [`MergeError::NotARepository`] if `/.git` is missing
    /// - [`MergeError::AbortFailed`] if any reset step fails
    pub async fn merge_abort(&self) -> Result<MergeOutcome, MergeError> {
        self.ensure_repository().await?;

        if !self.fs.exists(MERGE_HEAD).await {
            return Ok(MergeOutcome::nothing_to_abort());
        }

        let head = self
            .reset_to_head()
            .await
            .map_err(|message| MergeError::AbortFailed { message })?;
        self.sink.notify(ChangeEvent::whole_tree()).await;
        info!("merge aborted");
        Ok(MergeOutcome::aborted(head))
    }

    async fn reset_to_head(&self) -> Result<Option<Oid>, String> {
        self.fs.unlink(MERGE_HEAD).await.map_err(|e| e.to_string())?;
        if let Err(e) = self.fs.unlink(MERGE_MSG).await {
            debug!(error = %e, "no merge message to remove");
        }

        let head = self.store.head_oid().map_err(|e| e.to_string())?;
        match &head {
            Some(commit) => self
                .store
                .checkout(commit, true)
                .map_err(|e| e.to_string())?,
            None => return Err("HEAD does not point at a commit".to_string()),
        }
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::{FailOn as StoreFail, MockOperation, MockStore};
    use crate::merge::MergeStatus;
    use crate::notify::{ChangeKind, RecordingSink};
    use crate::vfs::MemoryFs;

    struct Fixture {
        store: MockStore,
        fs: MemoryFs,
        sink: RecordingSink,
    }

    impl Fixture {
        /// `main` and `feature` share a base commit containing `a.txt`.
        fn new() -> Self {
            let store = MockStore::new();
            store.commit("main", &[("a.txt", "base")]);
            store.create_branch("feature", "main");
            let fs = MemoryFs::with_files([("/.git/HEAD", "ref: refs/heads/main"), ("/a.txt", "base")]);
            Self {
                store,
                fs,
                sink: RecordingSink::new(),
            }
        }

        fn engine(&self) -> MergeEngine<MockStore> {
            MergeEngine::new(
                self.store.clone(),
                Arc::new(self.fs.clone()),
                Arc::new(self.sink.clone()),
            )
        }
    }

    fn opts() -> MergeOptions {
        MergeOptions::default()
    }

    mod preconditions {
        use super::*;

        #[tokio::test]
        async fn missing_git_dir_is_an_error() {
            let fx = Fixture::new();
            let engine = MergeEngine::new(
                fx.store.clone(),
                Arc::new(MemoryFs::new()),
                Arc::new(fx.sink.clone()),
            );
            assert!(matches!(
                engine.merge("feature", &opts()).await,
                Err(MergeError::NotARepository)
            ));
            assert!(matches!(
                engine.merge_abort().await,
                Err(MergeError::NotARepository)
            ));
        }

        #[tokio::test]
        async fn dirty_tree_blocks_without_mutation() {
            let fx = Fixture::new();
            fx.store.commit("feature", &[("a.txt", "feature")]);
            fx.store.modify_workdir("a.txt", Some("local edit"));
            let before = fx.store.tip("main");

            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();

            assert_eq!(outcome.status, MergeStatus::Dirty);
            assert_eq!(outcome.paths, vec!["a.txt"]);
            assert!(outcome.to_string().contains("would be overwritten"));
            assert_eq!(fx.store.tip("main"), before);
            assert!(fx.store.operations().is_empty());
            assert!(fx.sink.events().is_empty());
        }

        #[tokio::test]
        async fn staged_change_is_dirty() {
            let fx = Fixture::new();
            fx.store.stage("a.txt", "staged");
            fx.store.modify_workdir("a.txt", Some("staged"));
            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::Dirty);
        }

        #[tokio::test]
        async fn status_failure_counts_as_clean() {
            let fx = Fixture::new();
            fx.store.fail_on(StoreFail::StatusMatrix);
            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::UpToDate);
        }

        #[tokio::test]
        async fn self_merge_is_up_to_date() {
            let fx = Fixture::new();
            let engine = fx.engine();
            for _ in 0..2 {
                let outcome = engine.merge("main", &opts()).await.unwrap();
                assert_eq!(outcome.to_string(), "Already up to date.");
            }
            assert!(fx.store.operations().is_empty());
        }

        #[tokio::test]
        async fn unknown_branch_lists_branches() {
            let fx = Fixture::new();
            let outcome = fx.engine().merge("nonexistent", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::UnknownBranch);
            assert!(outcome.summary.contains("not something we can merge"));
            assert!(outcome.summary.contains("Available branches: feature, main"));
            assert!(fx.store.operations().is_empty());
        }

        #[tokio::test]
        async fn invalid_branch_name_is_unknown() {
            let fx = Fixture::new();
            let outcome = fx.engine().merge("bad..name", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::UnknownBranch);
        }

        #[tokio::test]
        async fn detached_head_falls_back_to_configured_branch() {
            let fx = Fixture::new();
            fx.store.detach();
            let engine = fx.engine().with_settings(MergeSettings {
                fallback_branch: "feature".to_string(),
            });
            let outcome = engine.merge("feature", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::UpToDate);
        }
    }

    mod fast_forward {
        use super::*;

        #[tokio::test]
        async fn moves_ref_and_checks_out_once() {
            let fx = Fixture::new();
            let old = fx.store.tip("main").unwrap();
            let new = fx.store.commit("feature", &[("a.txt", "base"), ("b.txt", "new")]);

            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();

            assert_eq!(outcome.status, MergeStatus::FastForward);
            assert_eq!(
                outcome.to_string(),
                format!("Updating {}..{}\nFast-forward", old.short(7), new.short(7))
            );
            assert_eq!(outcome.head, Some(new.clone()));
            assert_eq!(fx.store.tip("main"), Some(new.clone()));
            assert_eq!(
                fx.store.operations(),
                vec![
                    MockOperation::WriteRef {
                        branch: "main".into(),
                        commit: new.clone()
                    },
                    MockOperation::Checkout {
                        commit: new,
                        force: true
                    },
                ]
            );
            let events = fx.sink.events();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].path, ".");
            assert_eq!(events[0].kind, ChangeKind::Folder);
        }

        #[tokio::test]
        async fn no_ff_creates_merge_commit() {
            let fx = Fixture::new();
            let old = fx.store.tip("main").unwrap();
            let theirs = fx.store.commit("feature", &[("a.txt", "base"), ("b.txt", "new")]);

            let options = MergeOptions {
                no_ff: true,
                message: Some("keep history".into()),
            };
            let outcome = fx.engine().merge("feature", &options).await.unwrap();

            assert_eq!(outcome.status, MergeStatus::Merged);
            let head = outcome.head.unwrap();
            assert_eq!(fx.store.parents(&head), vec![old, theirs]);
            assert!(fx.store.operations().contains(&MockOperation::Merge {
                ours: "main".into(),
                theirs: "feature".into(),
                message: "keep history".into(),
            }));
            assert_eq!(fx.fs.read_to_string("/b.txt").await.unwrap(), "new");
        }

        #[tokio::test]
        async fn checkout_failure_is_wrapped() {
            let fx = Fixture::new();
            fx.store.commit("feature", &[("a.txt", "next")]);
            fx.store.fail_on(StoreFail::Checkout);
            let err = fx.engine().merge("feature", &opts()).await.unwrap_err();
            assert!(err.to_string().starts_with("git merge failed:"));
        }
    }

    mod three_way {
        use super::*;

        #[tokio::test]
        async fn reconciles_and_notifies() {
            let fx = Fixture::new();
            fx.store.commit("main", &[("a.txt", "base"), ("old.txt", "x")]);
            fx.fs.insert_file("/old.txt", b"x");
            fx.store.commit("feature", &[("a.txt", "feature"), ("lib/new.js", "n")]);

            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();

            assert_eq!(outcome.status, MergeStatus::Merged);
            let head = outcome.head.clone().unwrap();
            assert_eq!(
                outcome.to_string(),
                format!(
                    "Merge made by the 'ort' strategy.\nMerge commit: {}",
                    head.short(7)
                )
            );
            let mut expected: Vec<String> = fx
                .store
                .files_at(&head)
                .into_keys()
                .map(|p| format!("/{p}"))
                .collect();
            expected.sort();
            let files: Vec<String> = fx
                .fs
                .file_paths()
                .into_iter()
                .filter(|p| !p.starts_with("/.git/"))
                .collect();
            assert_eq!(files, expected);
            assert_eq!(fx.fs.read_to_string("/a.txt").await.unwrap(), "feature");

            let events = fx.sink.events();
            let last = events.last().unwrap();
            assert_eq!((last.path.as_str(), last.kind), (".", ChangeKind::Folder));
            assert!(events
                .iter()
                .any(|e| e.path == "/lib/new.js" && e.kind == ChangeKind::File));
        }

        #[tokio::test]
        async fn default_message_names_both_branches() {
            let fx = Fixture::new();
            fx.store.commit("main", &[("a.txt", "base"), ("m.txt", "1")]);
            fx.store.commit("feature", &[("a.txt", "base"), ("f.txt", "1")]);
            fx.engine().merge("feature", &opts()).await.unwrap();
            assert!(fx.store.operations().contains(&MockOperation::Merge {
                ours: "main".into(),
                theirs: "feature".into(),
                message: "Merge branch 'feature' into main".into(),
            }));
        }

        #[tokio::test]
        async fn already_merged_branch_is_up_to_date() {
            let fx = Fixture::new();
            fx.store.commit("main", &[("a.txt", "ahead")]);
            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();
            assert_eq!(outcome.status, MergeStatus::UpToDate);
            assert!(fx.sink.events().is_empty());
        }

        #[tokio::test]
        async fn conflict_is_an_outcome() {
            let fx = Fixture::new();
            fx.store.commit("main", &[("a.txt", "ours")]);
            fx.fs.insert_file("/a.txt", b"ours");
            fx.store.commit("feature", &[("a.txt", "theirs")]);
            let before = fx.store.tip("main");

            let outcome = fx.engine().merge("feature", &opts()).await.unwrap();

            assert_eq!(outcome.status, MergeStatus::Conflict);
            assert_eq!(outcome.paths, vec!["a.txt"]);
            assert!(outcome.summary.contains("not supported"));
            assert_eq!(fx.store.tip("main"), before);
            assert_eq!(fx.fs.read_to_string("/a.txt").await.unwrap(), "ours");
        }

        #[tokio::test]
        async fn store_failure_is_wrapped() {
            let fx = Fixture::new();
            fx.store.commit("main", &[("a.txt", "base"), ("m", "")]);
            fx.store.commit("feature", &[("a.txt", "base"), ("f", "")]);
            fx.store.fail_on(StoreFail::Merge);
            let err = fx.engine().merge("feature", &opts()).await.unwrap_err();
            assert!(err.to_string().starts_with("git merge failed: Merge failed:"));
        }
    }

    mod abort {
        use super::*;

        #[tokio::test]
        async fn nothing_to_abort() {
            let fx = Fixture::new();
            let outcome = fx.engine().merge_abort().await.unwrap();
            assert_eq!(outcome.status, MergeStatus::NothingToAbort);
            assert!(outcome.to_string().contains("no merge to abort"));
            assert!(fx.store.operations().is_empty());
            assert!(fx.sink.events().is_empty());
        }

        #[tokio::test]
        async fn removes_markers_and_resets() {
            let fx = Fixture::new();
            fx.fs.insert_file("/.git/MERGE_HEAD", b"abc");
            fx.fs.insert_file("/.git/MERGE_MSG", b"msg");
            let head = fx.store.tip("main").unwrap();

            let outcome = fx.engine().merge_abort().await.unwrap();

            assert_eq!(outcome.status, MergeStatus::Aborted);
            assert_eq!(outcome.head, Some(head.clone()));
            assert!(!fx.fs.exists(MERGE_HEAD).await);
            assert!(!fx.fs.exists(MERGE_MSG).await);
            assert_eq!(
                fx.store.operations(),
                vec![MockOperation::Checkout {
                    commit: head,
                    force: true
                }]
            );
            assert_eq!(fx.sink.events(), vec![ChangeEvent::whole_tree()]);
        }

        #[tokio::test]
        async fn missing_message_file_is_ignored() {
            let fx = Fixture::new();
            fx.fs.insert_file("/.git/MERGE_HEAD", b"abc");
            let outcome = fx.engine().merge_abort().await.unwrap();
            assert_eq!(outcome.status, MergeStatus::Aborted);
        }

        #[tokio::test]
        async fn reset_failure_is_abort_failed() {
            let fx = Fixture::new();
            fx.fs.insert_file("/.git/MERGE_HEAD", b"abc");
            fx.store.fail_on(StoreFail::Checkout);
            let err = fx.engine().merge_abort().await.unwrap_err();
            assert!(matches!(err, MergeError::AbortFailed { .. }));
        }
    }
}
