//! merge::outcome
//!
//! Result and error types for merge operations.
//!
//! Non-exceptional outcomes (dirty tree, unknown branch, conflict, ...) are
//! [`MergeOutcome`] values. Only conditions that prevented the operation from
//! being attempted, or failures inside it, are [`MergeError`]s.

use std::fmt;

use thiserror::Error;

use crate::core::types::Oid;
use crate::vfs::FsError;

/// Errors from merge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The project has no version-control metadata directory.
    #[error("not a git repository (or any of the parent directories): .git")]
    NotARepository,

    /// The merge was attempted and failed.
    #[error("git merge failed: {message}")]
    Failed {
        /// Description of the failure
        message: String,
    },

    /// Aborting an in-progress merge failed.
    #[error("git merge --abort failed: Failed to abort merge: {message}")]
    AbortFailed {
        /// Description of the failure
        message: String,
    },

    /// The metadata directory could not be inspected.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] FsError),
}

impl MergeError {
    pub(crate) fn failed(message: impl fmt::Display) -> Self {
        MergeError::Failed {
            message: message.to_string(),
        }
    }
}

/// Caller-supplied merge options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Always create a merge commit, even when a fast-forward is possible
    pub no_ff: bool,
    /// Merge commit message (defaults to `Merge branch '<theirs>' into <ours>`)
    pub message: Option<String>,
}

/// Which way a merge or abort ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    FastForward,
    /// A three-way merge commit was created
    Merged,
    UpToDate,
    /// Local changes would be overwritten; nothing was touched
    Dirty,
    /// The target is not an existing branch; nothing was touched
    UnknownBranch,
    /// Conflicting changes; nothing was touched
    Conflict,
    Aborted,
    NothingToAbort,
}

/// Outcome of [`super::MergeEngine::merge`] or
/// [`super::MergeEngine::merge_abort`].
///
/// `Display` renders the terminal summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    pub summary: String,
    /// New commit of the current branch, when it moved
    pub head: Option<Oid>,
    /// Paths the outcome is about (dirty or conflicting files)
    pub paths: Vec<String>,
}

impl MergeOutcome {
    fn new(status: MergeStatus, summary: String) -> Self {
        Self {
            status,
            summary,
            head: None,
            paths: Vec::new(),
        }
    }

    pub fn up_to_date() -> Self {
        Self::new(MergeStatus::UpToDate, "Already up to date.".to_string())
    }

    pub fn dirty(paths: Vec<String>) -> Self {
        let mut summary =
            "error: Your local changes to the following files would be overwritten by merge:\n"
                .to_string();
        for path in &paths {
            summary.push_str(&format!("\t{path}\n"));
        }
        summary.push_str("Please commit your changes or stash them before you merge.");
        Self {
            paths,
            ..Self::new(MergeStatus::Dirty, summary)
        }
    }

    pub fn unknown_branch(name: &str, available: &[String]) -> Self {
        Self::new(
            MergeStatus::UnknownBranch,
            format!(
                "merge: {name} - not something we can merge\nAvailable branches: {}",
                available.join(", ")
            ),
        )
    }

    pub fn fast_forward(from: &Oid, to: &Oid) -> Self {
        Self {
            head: Some(to.clone()),
            ..Self::new(
                MergeStatus::FastForward,
                format!("Updating {}..{}\nFast-forward", from.short(7), to.short(7)),
            )
        }
    }

    pub fn merged(commit: &Oid) -> Self {
        Self {
            head: Some(commit.clone()),
            ..Self::new(
                MergeStatus::Merged,
                format!(
                    "Merge made by the 'ort' strategy.\nMerge commit: {}",
                    commit.short(7)
                ),
            )
        }
    }

    pub fn conflict(paths: Vec<String>) -> Self {
        let mut summary = "CONFLICT: Automatic merge failed. Please resolve conflicts manually.\n\
             Merge conflicts detected in the following files:\n"
            .to_string();
        for path in &paths {
            summary.push_str(&format!("\t{path}\n"));
        }
        summary.push_str("Automatic conflict resolution is not supported.");
        Self {
            paths,
            ..Self::new(MergeStatus::Conflict, summary)
        }
    }

    pub fn aborted(head: Option<Oid>) -> Self {
        Self {
            head,
            ..Self::new(
                MergeStatus::Aborted,
                "Merge aborted. Working tree has been reset.".to_string(),
            )
        }
    }

    pub fn nothing_to_abort() -> Self {
        Self::new(
            MergeStatus::NothingToAbort,
            "fatal: There is no merge to abort (MERGE_HEAD missing).".to_string(),
        )
    }

    /// Whether the operation did what was asked (including "nothing to do").
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            MergeStatus::FastForward
                | MergeStatus::Merged
                | MergeStatus::UpToDate
                | MergeStatus::Aborted
        )
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(prefix: &str) -> Oid {
        Oid::new(format!("{prefix:0<40}")).unwrap()
    }

    #[test]
    fn fast_forward_uses_short_ids() {
        let outcome = MergeOutcome::fast_forward(&oid("abcdef12"), &oid("1234567f"));
        assert_eq!(outcome.to_string(), "Updating abcdef1..1234567\nFast-forward");
        assert!(outcome.is_success());
    }

    #[test]
    fn dirty_lists_each_path() {
        let outcome = MergeOutcome::dirty(vec!["a.txt".into(), "src/b.js".into()]);
        let text = outcome.to_string();
        assert!(text.starts_with("error: Your local changes"));
        assert!(text.contains("\ta.txt\n\tsrc/b.js\n"));
        assert!(text.ends_with("before you merge."));
        assert!(!outcome.is_success());
    }

    #[test]
    fn unknown_branch_lists_available() {
        let outcome =
            MergeOutcome::unknown_branch("nope", &["feature".to_string(), "main".to_string()]);
        assert_eq!(
            outcome.to_string(),
            "merge: nope - not something we can merge\nAvailable branches: feature, main"
        );
    }

    #[test]
    fn conflict_states_resolution_unsupported() {
        let outcome = MergeOutcome::conflict(vec!["a.txt".into()]);
        assert!(outcome.summary.starts_with("CONFLICT"));
        assert!(outcome.summary.contains("\ta.txt"));
        assert!(outcome.summary.contains("not supported"));
        assert_eq!(outcome.status, MergeStatus::Conflict);
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            MergeError::NotARepository.to_string(),
            "not a git repository (or any of the parent directories): .git"
        );
        assert_eq!(
            MergeError::failed("Merge failed: boom").to_string(),
            "git merge failed: Merge failed: boom"
        );
        assert!(MergeError::AbortFailed {
            message: "x".into()
        }
        .to_string()
        .starts_with("git merge --abort failed: Failed to abort merge"));
    }

    #[test]
    fn abort_texts() {
        assert!(MergeOutcome::nothing_to_abort()
            .to_string()
            .contains("no merge to abort"));
        assert_eq!(
            MergeOutcome::aborted(None).to_string(),
            "Merge aborted. Working tree has been reset."
        );
    }
}
