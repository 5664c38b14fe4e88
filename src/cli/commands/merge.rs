//! merge command - Join another branch into the current branch

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::debug;

use super::load_config;
use crate::cli::{Context, Reported};
use crate::git::{Git, GitError};
use crate::merge::{MergeEngine, MergeError, MergeOptions};
use crate::notify::TracingSink;
use crate::vfs::LocalFs;

/// Merge `branch` into the current branch, or abort an in-progress merge.
///
/// Non-success outcomes (conflicts, dirty tree, unknown branch) print the
/// summary to stderr as is and exit non-zero.
pub fn merge(
    ctx: &Context,
    branch: Option<&str>,
    no_ff: bool,
    message: Option<String>,
    abort: bool,
) -> Result<()> {
    let root = ctx.project_root()?;
    let config = load_config(&root)?;

    let store = match Git::open(&root) {
        Ok(git) => git,
        Err(GitError::NotARepo { .. }) => bail!(MergeError::NotARepository),
        Err(e) => return Err(e.into()),
    };
    let engine = MergeEngine::new(store, Arc::new(LocalFs::new(root.clone())), Arc::new(TracingSink))
        .with_settings(config.merge_settings());

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = if abort {
        rt.block_on(engine.merge_abort())?
    } else {
        let Some(branch) = branch else {
            bail!("a branch name is required");
        };
        let options = MergeOptions { no_ff, message };
        debug!(branch, no_ff = options.no_ff, "merging");
        rt.block_on(engine.merge(branch, &options))?
    };

    if !outcome.is_success() {
        eprintln!("{outcome}");
        return Err(Reported.into());
    }
    if !ctx.quiet {
        println!("{outcome}");
    }
    Ok(())
}
