//! Pyxis - project-side services for a browser IDE
//!
//! Pyxis runs next to a project tree and provides two services over it:
//! reproducing `git merge` / `git merge --abort` with every working-tree
//! change reported to the IDE, and executing project scripts as Node-style
//! modules in a sandbox whose only view of the world is that tree.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates)
//! - [`core`] - Domain types, virtual paths, configuration
//! - [`vfs`] - The [`Filesystem`](vfs::Filesystem) abstraction, in-memory and on-disk
//! - [`notify`] - Change events and the sinks that receive them
//! - [`git`] - Single interface for all Git operations
//! - [`merge`] - The merge engine
//! - [`js`] - The embedded script interpreter
//! - [`runtime`] - Module resolution and the Node-style sandbox
//!
//! # Correctness Invariants
//!
//! 1. Every mutation made on behalf of the IDE emits exactly one change event
//!    per file, folder or delete (or one whole-tree event for a checkout)
//! 2. A conflicting merge leaves the branch, index and working tree untouched
//! 3. Scripts reach the filesystem only through the emulated `fs` module

pub mod cli;
pub mod core;
pub mod git;
pub mod js;
pub mod merge;
pub mod notify;
pub mod runtime;
pub mod vfs;
