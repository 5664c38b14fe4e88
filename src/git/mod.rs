//! git
//!
//! The Version Store: branches, trees, blobs, checkout and three-way merge.
//!
//! # Architecture
//!
//! [`VersionStore`] is the contract the merge engine consumes. [`Git`] is
//! its production implementation and [`mock::MockStore`] backs tests. This
//! module is the **only doorway** to `git2`: no other module imports it.
//!
//! # Invariants
//!
//! - A branch ref always resolves to an existing commit
//! - All ids leaving this module are validated [`Oid`](crate::core::types::Oid)s
//! - After `merge` or `checkout`, the index matches the target tree
//!
//! # Example
//!
//! ```ignore
//! use pyxis::git::{Git, VersionStore};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! for branch in git.list_branches()? {
//!     println!("{branch}");
//! }
//! ```

mod interface;
pub mod mock;
mod store;

pub use interface::{Git, GitError};
pub use store::{
    Identity, MergeRequest, MergeResult, ObjectKind, StatusRow, TreeEntry, VersionStore,
};
