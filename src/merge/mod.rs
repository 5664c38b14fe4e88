//! merge
//!
//! The merge engine.
//!
//! # Architecture
//!
//! [`MergeEngine`] reproduces `git merge` / `git merge --abort` on top of
//! a [`VersionStore`](crate::git::VersionStore) and a
//! [`Filesystem`](crate::vfs::Filesystem), reporting every working-tree
//! change through a [`ChangeSink`](crate::notify::ChangeSink).
//!
//! - Fast-forward: move the branch ref, force-checkout, one whole-tree event
//! - Three-way: store merge primitive, then [`reconcile`] the working tree
//! - Conflicts are reported, never resolved
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pyxis::git::Git;
//! use pyxis::merge::{MergeEngine, MergeOptions};
//! use pyxis::notify::TracingSink;
//! use pyxis::vfs::LocalFs;
//!
//! let root = std::path::Path::new(".");
//! let engine = MergeEngine::new(Git::open(root)?, Arc::new(LocalFs::new(root)), Arc::new(TracingSink));
//! println!("{}", engine.merge("feature", &MergeOptions::default()).await?);
//! ```

mod engine;
mod outcome;
pub mod reconcile;

pub use engine::{MergeEngine, MERGE_HEAD, MERGE_MSG};
pub use outcome::{MergeError, MergeOptions, MergeOutcome, MergeStatus};
pub use reconcile::{reconcile, ReconcileReport};
