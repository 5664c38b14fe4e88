//! core::types
//!
//! Strong types for version-control concepts shared by the merge engine and
//! the version store.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//!
//! Both types validate at construction time, so a value that exists is a
//! value that Git would accept.
//!
//! # Examples
//!
//! ```
//! use pyxis::core::types::{BranchName, Oid};
//!
//! let branch = BranchName::new("feature/login").unwrap();
//! assert_eq!(branch.as_str(), "feature/login");
//!
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! assert_eq!(oid.short(7), "abc123d");
//!
//! assert!(BranchName::new("bad..name").is_err());
//! assert!(Oid::new("xyz").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),
}

/// A validated Git branch name (short form, without `refs/heads/`).
///
/// Follows `git check-ref-format --branch`: not empty, not `@`, no leading
/// `.` or `-`, no trailing `/` or `.lock`, no `..`, `@{`, `//`, whitespace,
/// control characters or any of `~^:\?*[`.
///
/// # Example
///
/// ```
/// use pyxis::core::types::BranchName;
///
/// assert!(BranchName::new("main").is_ok());
/// assert!(BranchName::new("user@topic").is_ok());
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("-x").is_err());
/// assert!(BranchName::new("a b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` naming the violated rule.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if let Some(rule) = Self::violation(&name) {
            return Err(TypeError::InvalidBranchName(format!("'{name}': {rule}")));
        }
        Ok(Self(name))
    }

    /// Return the first refname rule `name` breaks, if any.
    fn violation(name: &str) -> Option<&'static str> {
        const FORBIDDEN: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

        if name.is_empty() {
            return Some("cannot be empty");
        }
        if name == "@" {
            return Some("'@' is reserved");
        }
        if name.starts_with('-') {
            return Some("cannot start with '-'");
        }
        if name.ends_with('/') {
            return Some("cannot end with '/'");
        }
        if name.contains("..") || name.contains("@{") || name.contains("//") {
            return Some("cannot contain '..', '@{' or '//'");
        }
        if name.chars().any(|c| c.is_ascii_control() || FORBIDDEN.contains(&c)) {
            return Some("contains a forbidden character");
        }
        let bad_component = name
            .split('/')
            .any(|part| part.starts_with('.') || part.ends_with(".lock"));
        if bad_component {
            return Some("path components cannot start with '.' or end with '.lock'");
        }
        None
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full ref name (`refs/heads/<name>`).
    pub fn refname(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Git object identifier, normalized to lowercase hex.
///
/// Accepts SHA-1 (40 chars) and SHA-256 (64 chars) object names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not 40 or 64 hex digits.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(format!("'{oid}' is not hexadecimal")));
        }
        Ok(Self(oid))
    }

    /// Abbreviated form: the first `len` characters (or the whole id).
    ///
    /// ```
    /// use pyxis::core::types::Oid;
    ///
    /// let oid = Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap();
    /// assert_eq!(oid.short(7), "0123456");
    /// assert_eq!(oid.short(100).len(), 40);
    /// ```
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
