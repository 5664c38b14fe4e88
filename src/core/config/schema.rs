//! core::config::schema
//!
//! Configuration schema types.
//!
//! Global and project files share one schema; every value is optional so
//! a project file can override a single key without restating the rest.
//!
//! # Example
//!
//! ```toml
//! [merge]
//! fallback_branch = "main"
//!
//! [runtime]
//! cdn_endpoints = ["https://unpkg.com", "https://cdn.skypack.dev"]
//! cdn_fallback = true
//! node_version = "v18.0.0"
//! max_timer_runs = 10000
//! flush_delay_ms = 0
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// One configuration file (global or project scope).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Merge engine settings
    pub merge: Option<MergeSection>,

    /// Module runtime settings
    pub runtime: Option<RuntimeSection>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        if let Some(runtime) = &self.runtime {
            runtime.validate()?;
        }
        Ok(())
    }
}

/// `[merge]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSection {
    /// Branch name reported when HEAD is detached or unborn
    pub fallback_branch: Option<String>,
}

impl MergeSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.fallback_branch {
            BranchName::new(name).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid merge.fallback_branch: {e}"))
            })?;
        }
        Ok(())
    }
}

/// `[runtime]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// CDN base URLs, tried in order
    pub cdn_endpoints: Option<Vec<String>>,

    /// Whether bare specifiers may be fetched from the network at all
    pub cdn_fallback: Option<bool>,

    /// Value of `process.version`
    pub node_version: Option<String>,

    /// Upper bound on timer callbacks run while draining the event loop
    pub max_timer_runs: Option<usize>,

    /// Pause after each emulated `fs` mutation (milliseconds)
    pub flush_delay_ms: Option<u64>,
}

impl RuntimeSection {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoints) = &self.cdn_endpoints {
            if endpoints.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "runtime.cdn_endpoints cannot be empty".to_string(),
                ));
            }
            for url in endpoints {
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(ConfigError::InvalidValue(format!(
                        "runtime.cdn_endpoints entry '{url}' must be an http(s) URL"
                    )));
                }
            }
        }
        if let Some(version) = &self.node_version {
            if !version.starts_with('v') {
                return Err(ConfigError::InvalidValue(format!(
                    "runtime.node_version '{version}' must start with 'v'"
                )));
            }
        }
        if self.max_timer_runs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "runtime.max_timer_runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
