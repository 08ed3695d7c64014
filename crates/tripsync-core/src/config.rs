//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tripsync/config.toml)
//! 3. Environment variables (TRIPSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::SyncPolicy;

/// Environment variable prefix
const ENV_PREFIX: &str = "TRIPSYNC";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db, sync state)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote document store (optional)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token sent to the remote store
    #[serde(default)]
    pub api_token: Option<String>,

    /// Identity used to stamp records and filter pulled trips
    #[serde(default)]
    pub identity: Option<String>,

    /// Whether sync is enabled
    #[serde(default)]
    pub sync_enabled: bool,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Failed attempts before a queue entry is skipped
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Seconds between automatic pushes while online
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay between login and the first pull
    #[serde(default = "default_startup_debounce_ms")]
    pub startup_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_url: None,
            api_token: None,
            identity: None,
            sync_enabled: false,
            log_file: None,
            retry_ceiling: default_retry_ceiling(),
            poll_interval_secs: default_poll_interval_secs(),
            startup_debounce_ms: default_startup_debounce_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TRIPSYNC_DATA_DIR, TRIPSYNC_REMOTE_URL, ...)
    /// 2. Config file (~/.config/tripsync/config.toml or TRIPSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path when one was given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            self.remote_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_TOKEN", ENV_PREFIX)) {
            self.api_token = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_IDENTITY", ENV_PREFIX)) {
            self.identity = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TRIPSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tripsync")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("tripsync.db")
    }

    /// Get the path to the persisted sync history
    pub fn sync_state_path(&self) -> PathBuf {
        self.data_dir.join("sync_state.json")
    }

    /// Scheduling parameters for the sync orchestrator
    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            retry_ceiling: self.retry_ceiling,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            startup_debounce: Duration::from_millis(self.startup_debounce_ms),
        }
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripsync")
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_startup_debounce_ms() -> u64 {
    1500
}
