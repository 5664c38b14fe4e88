//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Project config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$PYXIS_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/pyxis/config.toml`
//! 3. `~/.pyxis/config.toml`
//!
//! # Project Config Location
//!
//! `<project>/.pyxis/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use pyxis::core::config::Config;
//! use std::path::Path;
//!
//! let loaded = Config::load(Some(Path::new("/path/to/project"))).unwrap();
//! let runtime = loaded.config.runtime_settings();
//! println!("CDN endpoints: {:?}", runtime.cdn_endpoints);
//! ```

pub mod schema;

pub use schema::{ConfigFile, MergeSection, RuntimeSection};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default CDN bases, in priority order.
pub const DEFAULT_CDN_ENDPOINTS: [&str; 3] = [
    "https://unpkg.com",
    "https://cdn.skypack.dev",
    "https://jspm.dev",
];

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: ConfigFile,
    /// Project configuration (if present)
    pub project: Option<ConfigFile>,
}

/// Resolved merge engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    /// Branch reported when HEAD is detached or unborn
    pub fallback_branch: String,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            fallback_branch: "main".to_string(),
        }
    }
}

/// Resolved module runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// CDN base URLs, tried in order
    pub cdn_endpoints: Vec<String>,
    /// Whether bare specifiers may be fetched from the network
    pub cdn_fallback: bool,
    /// Value of `process.version`
    pub node_version: String,
    /// Upper bound on timer callbacks per drain of the event loop
    pub max_timer_runs: usize,
    /// Pause after each emulated `fs` mutation (milliseconds)
    pub flush_delay_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            cdn_endpoints: DEFAULT_CDN_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            cdn_fallback: true,
            node_version: "v18.0.0".to_string(),
            max_timer_runs: 10_000,
            flush_delay_ms: 0,
        }
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// If `project_root` is provided, also loads the project file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated. Missing files are not an error.
    pub fn load(project_root: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        let project_path = project_root.map(Self::project_config_path);
        Self::load_files(global_path.as_deref(), project_path.as_deref())
    }

    /// Load from explicit file locations; either may be absent on disk.
    pub fn load_files(
        global_path: Option<&Path>,
        project_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let global = match global_path {
            Some(path) if path.exists() => Self::read_file(path)?,
            _ => ConfigFile::default(),
        };

        let project = match project_path {
            Some(path) if path.exists() => {
                let file = Self::read_file(path)?;
                if file == ConfigFile::default() {
                    warnings.push(ConfigWarning {
                        message: "project config file sets no values".to_string(),
                        path: path.to_path_buf(),
                    });
                }
                Some(file)
            }
            _ => None,
        };

        global.validate()?;
        if let Some(p) = &project {
            p.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config { global, project },
            warnings,
        })
    }

    /// Locate the global config file, if any exists.
    fn find_global() -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("PYXIS_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("pyxis/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".pyxis/config.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Canonical project config path.
    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(".pyxis/config.toml")
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Pick the project value if set, else the global one.
    fn pick<T: Clone>(&self, get: impl Fn(&ConfigFile) -> Option<T>) -> Option<T> {
        self.project.as_ref().and_then(&get).or_else(|| get(&self.global))
    }

    /// Merge settings with precedence applied.
    pub fn merge_settings(&self) -> MergeSettings {
        let defaults = MergeSettings::default();
        MergeSettings {
            fallback_branch: self
                .pick(|f| f.merge.as_ref().and_then(|m| m.fallback_branch.clone()))
                .unwrap_or(defaults.fallback_branch),
        }
    }

    /// Runtime settings with precedence applied.
    pub fn runtime_settings(&self) -> RuntimeSettings {
        let defaults = RuntimeSettings::default();
        let runtime = |f: &ConfigFile| f.runtime.clone();
        RuntimeSettings {
            cdn_endpoints: self
                .pick(|f| runtime(f).and_then(|r| r.cdn_endpoints))
                .unwrap_or(defaults.cdn_endpoints),
            cdn_fallback: self
                .pick(|f| runtime(f).and_then(|r| r.cdn_fallback))
                .unwrap_or(defaults.cdn_fallback),
            node_version: self
                .pick(|f| runtime(f).and_then(|r| r.node_version))
                .unwrap_or(defaults.node_version),
            max_timer_runs: self
                .pick(|f| runtime(f).and_then(|r| r.max_timer_runs))
                .unwrap_or(defaults.max_timer_runs),
            flush_delay_ms: self
                .pick(|f| runtime(f).and_then(|r| r.flush_delay_ms))
                .unwrap_or(defaults.flush_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_when_no_files() {
        let loaded = Config::load_files(None, None).unwrap();
        assert_eq!(loaded.config.merge_settings(), MergeSettings::default());
        assert_eq!(loaded.config.runtime_settings(), RuntimeSettings::default());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn project_overrides_global_per_key() {
        let dir = TempDir::new().unwrap();
        let global = write(
            &dir,
            "global.toml",
            "[runtime]\ncdn_fallback = false\nnode_version = \"v20.1.0\"\n",
        );
        let project = write(&dir, "project.toml", "[runtime]\nnode_version = \"v16.0.0\"\n");

        let loaded = Config::load_files(Some(&global), Some(&project)).unwrap();
        let runtime = loaded.config.runtime_settings();
        assert!(!runtime.cdn_fallback);
        assert_eq!(runtime.node_version, "v16.0.0");
        assert_eq!(runtime.cdn_endpoints.len(), 3);
    }

    #[test]
    fn missing_paths_are_ignored() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_files(Some(&missing), Some(&missing)).is_ok());
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.toml", "[runtime\n");
        let err = Config::load_files(None, Some(&bad)).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn empty_project_file_warns() {
        let dir = TempDir::new().unwrap();
        let empty = write(&dir, "empty.toml", "");
        let loaded = Config::load_files(None, Some(&empty)).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn fallback_branch_from_project() {
        let dir = TempDir::new().unwrap();
        let project = write(&dir, "p.toml", "[merge]\nfallback_branch = \"trunk\"\n");
        let loaded = Config::load_files(None, Some(&project)).unwrap();
        assert_eq!(loaded.config.merge_settings().fallback_branch, "trunk");
    }
}
