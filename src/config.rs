//! # Configuration Module
//!
//! This module handles runtime configuration for a [`crate::RhythmDb`]
//! instance: how often the background commit worker flushes staged changes,
//! whether the built-in entry types are registered on construction, and when
//! model rebuilds switch to parallel evaluation.
//!
//! ## Configuration File
//!
//! Configuration is stored as JSON. [`DbConfig::load`] resolves the file in
//! this order:
//! 1. An explicit path passed by the caller
//! 2. The path named by the `RHYTHMDB_CONFIG` environment variable
//! 3. The platform-standard config directory:
//!    - Linux: `~/.config/rhythmdb/config.json`
//!    - macOS: `~/Library/Application Support/rhythmdb/config.json`
//!    - Windows: `%APPDATA%\rhythmdb\config.json`
//!
//! A missing file at the platform location is not an error; defaults apply.
//! Missing fields in a file also fall back to their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "RHYTHMDB_CONFIG";

/// Runtime configuration for the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Milliseconds the commit worker waits between unrequested commits
    pub commit_interval_ms: u64,
    /// Register song, ignore, import-error and podcast types on construction
    pub register_builtin_types: bool,
    /// Candidate count at which model rebuilds evaluate in parallel
    pub parallel_threshold: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            commit_interval_ms: 1000,
            register_builtin_types: true,
            parallel_threshold: 2048,
        }
    }
}

impl DbConfig {
    /// Loads configuration using the resolution order described above.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file (argument or
    /// `RHYTHMDB_CONFIG`) cannot be read or parsed, or if the file at the
    /// platform location exists but is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rhythmdb::config::DbConfig;
    ///
    /// let config = DbConfig::load(None)?;
    /// println!("commit every {:?}", config.commit_interval());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            return Self::from_file(&path)
                .with_context(|| format!("{CONFIG_ENV} points to an unusable file"));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                log::debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create configuration directory {}. Please check permissions.",
                    parent.display()
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write configuration file at {}", path.display()))
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms.max(1))
    }
}

/// Returns the platform-appropriate configuration file path, if the platform
/// has a configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rhythmdb").join("config.json"))
}
