//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/rightnow/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/rightnow/` (~/.config/rightnow/)
//! - Data: `$XDG_DATA_HOME/rightnow/` (~/.local/share/rightnow/)
//! - State/Logs: `$XDG_STATE_HOME/rightnow/` (~/.local/state/rightnow/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which document to open when none is given
    #[serde(default)]
    pub document: DocumentConfig,

    /// Change watcher settings
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Document selection
#[derive(Debug, Deserialize, Default)]
pub struct DocumentConfig {
    /// Document used when the CLI is invoked without a path.
    /// A leading `~/` is expanded to the home directory.
    pub default_path: Option<PathBuf>,
}

impl DocumentConfig {
    /// Returns the configured default path with `~` expanded
    pub fn resolved_default_path(&self) -> Option<PathBuf> {
        self.default_path.as_deref().map(expand_home)
    }
}

/// Change watcher configuration
#[derive(Debug, Deserialize)]
pub struct WatcherConfig {
    /// Reload the document when it changes on disk
    #[serde(default = "default_watcher_enabled")]
    pub enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_watcher_enabled(),
        }
    }
}

fn default_watcher_enabled() -> bool {
    true
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/rightnow/config.toml` (~/.config/rightnow/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("rightnow").join("config.toml")
    }

    /// Returns the data directory path (for the recent-projects list)
    ///
    /// `$XDG_DATA_HOME/rightnow/` (~/.local/share/rightnow/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("rightnow")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/rightnow/` (~/.local/state/rightnow/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("rightnow")
    }

    /// Returns the recent-projects file path
    ///
    /// `$XDG_DATA_HOME/rightnow/recent.json`
    pub fn recent_projects_path() -> PathBuf {
        Self::data_dir().join("recent.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/rightnow/rightnow.log` (~/.local/state/rightnow/rightnow.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("rightnow.log")
    }
}
