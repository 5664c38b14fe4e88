//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Merges and script runs are async. Each handler builds its own tokio
//! runtime and blocks on it; the script runtime is single-threaded and is
//! never moved across tasks.

mod completion;
mod merge;
mod run;

pub use completion::completion;
pub use merge::merge;
pub use run::{eval, run};

use std::path::Path;

use anyhow::Result;
use tracing::warn;

use super::args::Command;
use super::Context;
use crate::core::config::Config;

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Merge {
            branch,
            no_ff,
            message,
            abort,
        } => merge(ctx, branch.as_deref(), no_ff, message, abort),
        Command::Run { file } => run(ctx, &file),
        Command::Eval { code } => eval(ctx, &code),
        Command::Completion { shell } => completion(shell),
    }
}

/// Load configuration for a project, logging any warnings.
fn load_config(root: &Path) -> Result<Config> {
    let loaded = Config::load(Some(root))?;
    for warning in &loaded.warnings {
        warn!(path = %warning.path.display(), "{}", warning.message);
    }
    Ok(loaded.config)
}
