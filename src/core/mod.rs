//! core
//!
//! Core domain types and shared utilities for Pyxis.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid
//! - [`paths`] - POSIX path algebra for the virtual project filesystem
//! - [`config`] - Configuration schema and loading

pub mod config;
pub mod paths;
pub mod types;
