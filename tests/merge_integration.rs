//! Integration tests for the merge engine against real repositories.
//!
//! Repositories are built with the `git` CLI in temporary directories, then
//! merged through [`Git`] and [`LocalFs`] exactly as `pyx merge` does.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use pyxis::git::{Git, VersionStore};
use pyxis::merge::{MergeEngine, MergeError, MergeOptions, MergeStatus};
use pyxis::notify::{ChangeEvent, RecordingSink};
use pyxis::vfs::LocalFs;

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository on `main` with one commit containing `README.md`.
struct TestRepo {
    dir: TempDir,
    sink: RecordingSink,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);

        let repo = Self {
            dir,
            sink: RecordingSink::new(),
        };
        repo.commit_file("README.md", "# Test\n", "Initial commit");
        repo
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path)).unwrap()
    }

    fn commit_file(&self, path: &str, content: &str, message: &str) {
        self.write(path, content);
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-q", "-m", message]);
    }

    fn checkout(&self, branch: &str) {
        run_git(self.path(), &["checkout", "-q", branch]);
    }

    fn branch(&self, name: &str) {
        run_git(self.path(), &["branch", name]);
    }

    fn rev(&self, rev: &str) -> String {
        run_git(self.path(), &["rev-parse", rev])
    }

    fn engine(&self) -> MergeEngine<Git> {
        MergeEngine::new(
            Git::open(self.path()).expect("failed to open test repo"),
            Arc::new(LocalFs::new(self.path().to_path_buf())),
            Arc::new(self.sink.clone()),
        )
    }
}

fn opts() -> MergeOptions {
    MergeOptions::default()
}

mod fast_forward {
    use super::*;

    #[tokio::test]
    async fn moves_branch_and_updates_tree() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.checkout("feature");
        repo.commit_file("src/app.js", "console.log('app')\n", "Add app");
        repo.checkout("main");

        let outcome = repo.engine().merge("feature", &opts()).await.unwrap();

        assert_eq!(outcome.status, MergeStatus::FastForward);
        assert!(outcome.summary.ends_with("Fast-forward"));
        assert_eq!(repo.rev("main"), repo.rev("feature"));
        assert_eq!(repo.read("src/app.js"), "console.log('app')\n");
        assert_eq!(repo.sink.events(), vec![ChangeEvent::whole_tree()]);
    }

    #[tokio::test]
    async fn removes_files_deleted_on_the_target() {
        let repo = TestRepo::new();
        repo.commit_file("old.txt", "old\n", "Add old");
        repo.branch("cleanup");
        repo.checkout("cleanup");
        run_git(repo.path(), &["rm", "-q", "old.txt"]);
        run_git(repo.path(), &["commit", "-q", "-m", "Remove old"]);
        repo.checkout("main");

        repo.engine().merge("cleanup", &opts()).await.unwrap();
        assert!(!repo.path().join("old.txt").exists());
    }

    #[tokio::test]
    async fn no_ff_creates_a_merge_commit() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.checkout("feature");
        repo.commit_file("a.txt", "a\n", "Add a");
        repo.checkout("main");

        let outcome = repo
            .engine()
            .merge(
                "feature",
                &MergeOptions {
                    no_ff: true,
                    message: Some("Bring in feature".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, MergeStatus::Merged);
        assert_ne!(repo.rev("main"), repo.rev("feature"));
        assert_eq!(run_git(repo.path(), &["log", "-1", "--format=%s"]), "Bring in feature");
        assert_eq!(
            run_git(repo.path(), &["log", "-1", "--format=%P"])
                .split(' ')
                .count(),
            2
        );
        assert_eq!(repo.read("a.txt"), "a\n");
    }
}

mod three_way {
    use super::*;

    fn diverged() -> TestRepo {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.commit_file("main.txt", "from main\n", "Main work");
        repo.checkout("feature");
        repo.commit_file("docs/feature.md", "from feature\n", "Feature work");
        repo.checkout("main");
        repo
    }

    #[tokio::test]
    async fn merge_commit_and_reconciled_tree() {
        let repo = diverged();
        let outcome = repo.engine().merge("feature", &opts()).await.unwrap();

        assert_eq!(outcome.status, MergeStatus::Merged);
        assert!(outcome.summary.starts_with("Merge made by the 'ort' strategy."));
        assert_eq!(
            run_git(repo.path(), &["log", "-1", "--format=%s"]),
            "Merge branch 'feature' into main"
        );
        assert_eq!(repo.read("docs/feature.md"), "from feature\n");
        assert_eq!(repo.read("main.txt"), "from main\n");

        let events = repo.sink.events();
        assert!(events.contains(&ChangeEvent::file("/docs/feature.md", "from feature\n")));
        assert_eq!(events.last(), Some(&ChangeEvent::whole_tree()));
    }

    #[tokio::test]
    async fn merged_tree_is_clean() {
        let repo = diverged();
        let engine = repo.engine();
        engine.merge("feature", &opts()).await.unwrap();

        let rows = engine.store().status_matrix().unwrap();
        assert!(rows.iter().all(|row| row.is_clean()), "{rows:?}");
        assert_eq!(run_git(repo.path(), &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn conflicts_leave_everything_untouched() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.commit_file("README.md", "# Main\n", "Main readme");
        repo.checkout("feature");
        repo.commit_file("README.md", "# Feature\n", "Feature readme");
        repo.checkout("main");
        let before = repo.rev("main");

        let outcome = repo.engine().merge("feature", &opts()).await.unwrap();

        assert_eq!(outcome.status, MergeStatus::Conflict);
        assert_eq!(outcome.paths, vec!["README.md"]);
        assert!(!outcome.is_success());
        assert_eq!(repo.rev("main"), before);
        assert_eq!(repo.read("README.md"), "# Main\n");
        assert!(repo.sink.events().is_empty());
    }

    #[tokio::test]
    async fn already_merged_branch_is_up_to_date() {
        let repo = TestRepo::new();
        repo.branch("old");
        repo.commit_file("new.txt", "new\n", "Ahead");

        let outcome = repo.engine().merge("old", &opts()).await.unwrap();
        assert_eq!(outcome.status, MergeStatus::UpToDate);
        assert_eq!(outcome.to_string(), "Already up to date.");
    }
}

mod refusals {
    use super::*;

    #[tokio::test]
    async fn dirty_tracked_files_block_the_merge() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.checkout("feature");
        repo.commit_file("x.txt", "x\n", "Add x");
        repo.checkout("main");
        repo.write("README.md", "local edit\n");

        let outcome = repo.engine().merge("feature", &opts()).await.unwrap();
        assert_eq!(outcome.status, MergeStatus::Dirty);
        assert_eq!(outcome.paths, vec!["README.md"]);
        assert_eq!(repo.read("README.md"), "local edit\n");
        assert!(!repo.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn untracked_files_do_not_block() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.checkout("feature");
        repo.commit_file("x.txt", "x\n", "Add x");
        repo.checkout("main");
        repo.write("scratch.txt", "mine\n");

        let outcome = repo.engine().merge("feature", &opts()).await.unwrap();
        assert_eq!(outcome.status, MergeStatus::FastForward);
        assert_eq!(repo.read("scratch.txt"), "mine\n");
    }

    #[tokio::test]
    async fn unknown_branch_lists_available() {
        let repo = TestRepo::new();
        repo.branch("feature");

        let outcome = repo.engine().merge("nope", &opts()).await.unwrap();
        assert_eq!(outcome.status, MergeStatus::UnknownBranch);
        assert_eq!(
            outcome.summary,
            "merge: nope - not something we can merge\nAvailable branches: feature, main"
        );
    }

    #[tokio::test]
    async fn merging_the_current_branch_is_a_no_op() {
        let repo = TestRepo::new();
        let outcome = repo.engine().merge("main", &opts()).await.unwrap();
        assert_eq!(outcome.status, MergeStatus::UpToDate);
    }

    #[test]
    fn plain_directories_are_not_repositories() {
        let dir = TempDir::new().unwrap();
        assert!(Git::open(dir.path()).is_err());
    }

    #[tokio::test]
    async fn engine_requires_git_metadata() {
        let repo = TestRepo::new();
        let engine = repo.engine();
        std::fs::rename(repo.path().join(".git"), repo.path().join("git-moved")).unwrap();

        let err = engine.merge("main", &opts()).await.unwrap_err();
        assert!(matches!(err, MergeError::NotARepository));
    }
}

mod abort {
    use super::*;

    #[tokio::test]
    async fn nothing_to_abort() {
        let repo = TestRepo::new();
        let outcome = repo.engine().merge_abort().await.unwrap();
        assert_eq!(outcome.status, MergeStatus::NothingToAbort);
        assert!(repo.sink.events().is_empty());
    }

    #[tokio::test]
    async fn resets_an_in_progress_merge() {
        let repo = TestRepo::new();
        repo.branch("feature");
        repo.commit_file("README.md", "# Main\n", "Main readme");
        repo.checkout("feature");
        repo.commit_file("README.md", "# Feature\n", "Feature readme");
        repo.checkout("main");

        // Leave a conflicted merge behind with the git CLI.
        let status = Command::new("git")
            .args(["merge", "feature"])
            .current_dir(repo.path())
            .output()
            .unwrap()
            .status;
        assert!(!status.success());
        assert!(repo.path().join(".git/MERGE_HEAD").exists());

        let outcome = repo.engine().merge_abort().await.unwrap();

        assert_eq!(outcome.status, MergeStatus::Aborted);
        assert_eq!(outcome.head.map(|oid| oid.to_string()), Some(repo.rev("HEAD")));
        assert!(!repo.path().join(".git/MERGE_HEAD").exists());
        assert_eq!(repo.read("README.md"), "# Main\n");
        assert_eq!(repo.sink.events(), vec![ChangeEvent::whole_tree()]);
    }
}
