//! Configuration management for Grove.
//!
//! Configuration is stored in TOML format in a platform-appropriate location
//! and controls which files a walk accepts.

use crate::classify::ContentPolicy;
use crate::error::{GroveError, Result};
use crate::indexer::{WalkOptions, DEFAULT_SKIP_DIRS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Grove.
///
/// ## Example Configuration File (grove.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
///
/// [walk]
/// max_file_size = 1048576
/// sniff_len = 8000
/// max_non_text_ratio = 0.3
/// skip_dirs = [".git", ".hg", ".svn", ".bzr"]
/// exclude = ["*.min.js", "vendor/**"]
/// skip_hidden = false
/// respect_gitignore = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// File selection and classification
    pub walk: WalkConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Walk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,

    /// Number of leading bytes inspected by the binary heuristic
    pub sniff_len: usize,

    /// Maximum fraction of control bytes in the sniffed prefix before a
    /// file counts as binary
    pub max_non_text_ratio: f64,

    /// Directory names never descended into (version control metadata)
    pub skip_dirs: Vec<String>,

    /// Glob patterns matched against relative paths
    pub exclude: Vec<String>,

    /// Skip dotfiles and dot-directories during recursive walks
    pub skip_hidden: bool,

    /// Honour .gitignore files during recursive walks
    pub respect_gitignore: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        let policy = ContentPolicy::default();
        WalkConfig {
            max_file_size: policy.max_file_size,
            sniff_len: policy.sniff_len,
            max_non_text_ratio: policy.max_non_text_ratio,
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|d| d.to_string()).collect(),
            exclude: Vec::new(),
            skip_hidden: false,
            respect_gitignore: false,
        }
    }
}

impl WalkConfig {
    /// Validate the configuration and build walk options from it.
    pub fn to_options(&self) -> Result<WalkOptions> {
        if !(0.0..=1.0).contains(&self.max_non_text_ratio) {
            return Err(GroveError::config(format!(
                "max_non_text_ratio must be between 0 and 1, got {}",
                self.max_non_text_ratio
            )));
        }
        if self.sniff_len == 0 {
            return Err(GroveError::config("sniff_len must be greater than 0"));
        }

        WalkOptions::new()
            .with_max_file_size(self.max_file_size)
            .with_sniff_len(self.sniff_len)
            .with_max_non_text_ratio(self.max_non_text_ratio)
            .with_skip_dirs(self.skip_dirs.clone())
            .with_skip_hidden(self.skip_hidden)
            .with_respect_gitignore(self.respect_gitignore)
            .with_exclude(&self.exclude)
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| GroveError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GroveError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "grove")
            .ok_or_else(|| GroveError::config("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("grove.toml"))
    }
}
