//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Use this directory as the project root
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pyxis - git merge and a sandboxed Node-style runtime for a project tree
#[derive(Parser, Debug)]
#[command(name = "pyx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output: only results and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join another branch into the current branch
    #[command(
        name = "merge",
        long_about = "Join another branch into the current branch.\n\n\
            Fast-forwards when the current branch is an ancestor of the target \
            (unless --no-ff is given), otherwise creates a merge commit and updates \
            the working tree to the merged result.\n\n\
            The merge is refused when tracked files have local changes. Conflicts \
            are reported with the conflicting paths; they are never resolved \
            automatically and nothing is modified.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bring a feature branch into the current branch
    pyx merge feature

    # Always record a merge commit
    pyx merge feature --no-ff -m \"Merge feature work\"

    # Give up on an in-progress merge
    pyx merge --abort"
    )]
    Merge {
        /// Branch to merge into the current branch
        #[arg(required_unless_present = "abort")]
        branch: Option<String>,

        /// Create a merge commit even when a fast-forward is possible
        #[arg(long)]
        no_ff: bool,

        /// Merge commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Abort the in-progress merge and reset to HEAD
        #[arg(long, conflicts_with_all = ["branch", "no_ff", "message"])]
        abort: bool,
    },

    /// Execute a project file as a Node-style module
    #[command(
        name = "run",
        long_about = "Execute a project file as a Node-style module.\n\n\
            The file runs on the embedded interpreter with require, module, \
            exports, process, Buffer, console and timers. Built-in fs, path, os \
            and util are emulated against the project directory; packages not \
            found under node_modules are fetched from a CDN unless disabled in \
            the configuration.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Run a build script
    pyx run scripts/build.js

    # Run with resolution and CDN traffic logged
    pyx --debug run index.js"
    )]
    Run {
        /// File to execute, relative to the project root
        file: String,
    },

    /// Execute inline source text
    #[command(name = "eval")]
    Eval {
        /// Source to execute as the module <root>/script.js
        code: String,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
INSTALLATION:
    # Bash (add to ~/.bashrc)
    eval \"$(pyx completion bash)\"

    # Zsh (add to ~/.zshrc)
    eval \"$(pyx completion zsh)\"

    # Fish
    pyx completion fish > ~/.config/fish/completions/pyx.fish

    # PowerShell
    pyx completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Shells supported by `pyx completion`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_arguments() {
        let cli = Cli::try_parse_from(["pyx", "merge", "feature", "--no-ff", "-m", "msg"]).unwrap();
        match cli.command {
            Command::Merge {
                branch,
                no_ff,
                message,
                abort,
            } => {
                assert_eq!(branch.as_deref(), Some("feature"));
                assert!(no_ff);
                assert_eq!(message.as_deref(), Some("msg"));
                assert!(!abort);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn merge_needs_a_branch_or_abort() {
        assert!(Cli::try_parse_from(["pyx", "merge"]).is_err());
        assert!(Cli::try_parse_from(["pyx", "merge", "--abort"]).is_ok());
        assert!(Cli::try_parse_from(["pyx", "merge", "x", "--abort"]).is_err());
    }

    #[test]
    fn global_flags_after_the_subcommand() {
        let cli = Cli::try_parse_from(["pyx", "run", "a.js", "--cwd", "/tmp/p", "--debug"]).unwrap();
        assert_eq!(cli.cwd, Some(PathBuf::from("/tmp/p")));
        assert!(cli.debug);
    }
}
