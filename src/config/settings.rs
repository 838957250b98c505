//! Configuration settings for planner-sync.
//!
//! Settings are loaded from `~/.planner-sync/config.yaml`. Every field has a
//! default, so a partial (or missing) file is fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::SyncError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Remote authority and trigger settings.
    pub sync: SyncConfig,
    /// Retry scheduling settings.
    pub backoff: BackoffConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Remote authority and trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL the `/api/...` endpoints are resolved against.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Seconds between periodic drain requests.
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,
    /// Per-request deadline in seconds; 0 leaves requests unbounded.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Tag identifying background-sync wake messages.
    #[serde(default = "default_background_sync_tag")]
    pub background_sync_tag: String,
}

/// Retry scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry, doubled per failed attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound on the doubled delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Exclusive upper bound of the random jitter added to every delay.
    #[serde(default = "default_max_jitter")]
    pub max_jitter_ms: u64,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_periodic_interval() -> u64 {
    60
}

const fn default_request_timeout() -> u64 {
    30
}

fn default_background_sync_tag() -> String {
    "planner-sync".to_string()
}

const fn default_base_delay() -> u64 {
    2_000
}

const fn default_max_delay() -> u64 {
    300_000
}

const fn default_max_jitter() -> u64 {
    1_000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            periodic_interval_secs: default_periodic_interval(),
            request_timeout_secs: default_request_timeout(),
            background_sync_tag: default_background_sync_tag(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_jitter_ms: default_max_jitter(),
        }
    }
}

impl SyncConfig {
    /// Periodic trigger interval, never shorter than one second.
    #[must_use]
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs.max(1))
    }

    /// Request deadline, if one is configured.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }
}

impl Config {
    /// Load configuration from the given paths.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load(paths: &Paths) -> Result<Self, SyncError> {
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration under the given paths, creating the root if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self, paths: &Paths) -> Result<(), SyncError> {
        paths.ensure_dirs()?;
        self.save_to_path(&paths.config_file)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}
