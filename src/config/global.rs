//! Global configuration management for binguard.
//!
//! This module handles the user configuration file (`~/.binguard/config.toml`)
//! which controls where the managed binary comes from, how often it is
//! refreshed and which network policy is used to fetch it.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.binguard/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\binguard\config.toml`
//!
//! The location can be overridden with the `BINGUARD_CONFIG_PATH` environment
//! variable or the `--config` flag. A missing file yields the defaults.
//!
//! # File Format
//!
//! ```toml
//! [update]
//! base_url = "https://downloads.binguard.dev"
//! release_channel = "stable"
//! check_interval_days = 4
//! binary_path = "/opt/binguard/engine-linux"
//!
//! [network]
//! proxy = "http://proxy.corp.example:3128"
//! ```
//!
//! # Persisted State
//!
//! The installed-binary state lives next to the configuration file as
//! `state.json` (see [`GlobalConfig::state_path_for`]). It is written by
//! binguard itself and should not be edited by hand.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binguard_cli::config::GlobalConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! println!("Release channel: {}", config.update.release_channel);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::NetworkConfig;
use crate::constants::{CONFIG_PATH_ENV, STATE_FILE_NAME, STATE_PATH_ENV};
use crate::upgrade::config::UpdateConfig;

/// Global configuration structure for binguard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Update behaviour of the managed binary.
    #[serde(default)]
    pub update: UpdateConfig,

    /// HTTP client policy.
    #[serde(default)]
    pub network: NetworkConfig,
}

impl GlobalConfig {
    /// Load global configuration from the default location.
    ///
    /// Returns the defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The default path cannot be determined
    /// - The file exists but cannot be read
    /// - The file contains invalid TOML syntax
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load global configuration from an optional explicit path.
    ///
    /// Without a path, `BINGUARD_CONFIG_PATH` and then the platform default are
    /// used. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load global configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (permissions, not found, etc.)
    /// - The file contains invalid TOML syntax
    /// - The TOML structure doesn't match the expected schema
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Save global configuration to a specific file path.
    ///
    /// Creates parent directories as needed and writes pretty-formatted TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directories cannot be created
    /// - The file cannot be written
    /// - Serialization to TOML fails
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// Get the default file path for global configuration.
    ///
    /// `BINGUARD_CONFIG_PATH` wins over the platform location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        resolve_path(std::env::var_os(CONFIG_PATH_ENV), "config.toml")
    }

    /// Get the default file path of the persisted binary state.
    ///
    /// Same as [`GlobalConfig::state_path_for`] without an explicit config path.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be determined.
    pub fn default_state_path() -> Result<PathBuf> {
        Self::state_path_for(None)
    }

    /// Get the state file path that belongs to a configuration file.
    ///
    /// In order of precedence:
    /// 1. `BINGUARD_STATE_PATH`
    /// 2. `state.json` next to `config_path`, or next to `BINGUARD_CONFIG_PATH`
    /// 3. `state.json` in the platform configuration directory
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be determined.
    pub fn state_path_for(config_path: Option<&Path>) -> Result<PathBuf> {
        let config_path = config_path.map(Path::to_path_buf).or_else(|| {
            std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()).map(PathBuf::from)
        });
        resolve_state_path(std::env::var_os(STATE_PATH_ENV), config_path.as_deref())
    }
}

fn resolve_state_path(state_override: Option<OsString>, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = state_override.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    match config_path {
        Some(config_path) => {
            let dir = match config_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            Ok(dir.join(STATE_FILE_NAME))
        }
        None => Ok(config_dir()?.join(STATE_FILE_NAME)),
    }
}

fn resolve_path(override_path: Option<OsString>, file_name: &str) -> Result<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join(file_name))
}

/// Platform directory holding binguard's configuration and state.
///
/// # Errors
///
/// Returns an error if the home (or local data) directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("binguard")
    } else {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".binguard")
    };
    Ok(dir)
}
