//! cli
//!
//! Command-line interface layer for Pyxis.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Initialize logging
//! - Delegate to command handlers
//!
//! The CLI layer is thin. Merges go through [`crate::merge::MergeEngine`]
//! and script execution through [`crate::runtime::NodeRuntime`]; handlers
//! only wire the project directory into them and print the results.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, Shell};

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "PYX_LOG";

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Project root override (`--cwd`)
    pub cwd: Option<PathBuf>,
    pub debug: bool,
    pub quiet: bool,
}

impl Context {
    /// The project directory: `--cwd` if given, else the process directory.
    pub fn project_root(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().context("cannot determine the current directory"),
        }
    }
}

/// Failure whose message a command has already written to stderr.
#[derive(Debug, thiserror::Error)]
#[error("command failed")]
pub struct Reported;

/// Install the stderr log subscriber.
///
/// `PYX_LOG` wins when set; otherwise `--debug` selects `debug` and the
/// default is `warn`.
fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second initialization (tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let ctx = Context {
        cwd: cli.cwd.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}
