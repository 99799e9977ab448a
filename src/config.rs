//! Configuration management with hierarchical overrides using figment.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Environment variables (`SKYWARDEN_*`, `__` as section separator)
//! 2. User configuration file (~/.config/skywarden/config.toml)
//! 3. System configuration file (/etc/skywarden/config.toml)
//! 4. Embedded defaults (lowest precedence)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] figment::Error),

    #[error("IO error reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

/// Main configuration structure for the monitoring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MonitorConfig {
    /// Identity of this monitoring node, stamped on emitted events
    pub node: NodeConfig,
    /// Wireless detector thresholds and known networks
    pub detectors: DetectorConfig,
    /// Per-asset-type tracker settings, keyed by asset type
    pub trackers: HashMap<String, TrackerConfig>,
    /// Alert queue debounce/batch/age parameters
    pub queue: QueueConfig,
    /// Response hook cooldown and dispatch settings
    pub hooks: HookConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Node identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Node identifier stamped on every event this node emits
    pub node_id: String,
}

/// Wireless detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Deauth frames within the window required to fire an alert
    pub deauth_threshold: usize,
    /// Deauth sliding window length in seconds
    pub deauth_window_seconds: u64,
    /// SSIDs of networks this deployment owns
    pub known_ssids: Vec<String>,
    /// BSSIDs legitimately broadcasting the known SSIDs
    pub known_bssids: Vec<String>,
}

/// Per-asset-type tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerConfig {
    /// Enable tracking for this asset type
    pub enabled: bool,
    /// Seconds without an observation before an asset counts as stale
    pub stale_after_seconds: u64,
    /// Maximum distinct assets retained; oldest observations are evicted past this
    pub max_assets: usize,
}

/// Alert queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Quiet period required before a debounce flush
    pub debounce_seconds: f64,
    /// Pending-entry count that forces an immediate flush
    pub max_batch_size: usize,
    /// Maximum age of a batch before it is flushed regardless of activity
    pub max_age_seconds: f64,
}

/// Response hook configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookConfig {
    /// Default minimum seconds between dispatches for the same (task, rule) pair
    pub cooldown_seconds: u64,
    /// Timeout handed to the task runner per dispatch
    pub task_timeout_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, human)
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "skywarden-node".to_owned(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            deauth_threshold: 10,
            deauth_window_seconds: 10,
            known_ssids: Vec::new(),
            known_bssids: Vec::new(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_seconds: 300,
            max_assets: 100,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: 5.0,
            max_batch_size: 20,
            max_age_seconds: 30.0,
        }
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            task_timeout_seconds: 120,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "human".to_owned(),
        }
    }
}

/// Configuration loader with hierarchical override support.
pub struct ConfigLoader {
    component: String,
}

impl ConfigLoader {
    /// Create a new configuration loader for the specified component.
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_owned(),
        }
    }

    /// Load configuration with hierarchical overrides using figment.
    pub fn load(&self) -> Result<MonitorConfig, ConfigError> {
        let mut figment = Figment::new()
            // Start with embedded defaults
            .merge(Serialized::defaults(MonitorConfig::default()));

        // System configuration file (optional)
        let system_config_path = "/etc/skywarden/config.toml";
        if std::path::Path::new(system_config_path).exists() {
            figment = figment.merge(Toml::file(system_config_path));
        }

        // User configuration file (optional)
        let user_config_path = Self::user_config_path();
        if user_config_path.exists() {
            figment = figment.merge(Toml::file(&user_config_path));
        }

        // Environment variables with component prefix
        figment = figment.merge(
            Env::prefixed(&format!(
                "{}_",
                self.component.replace('-', "_").to_uppercase()
            ))
            .split("__"),
        );

        let config = figment.extract()?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Get the user configuration file path using platform-aware directory lookup.
    fn user_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("skywarden").join("config.toml");
        }

        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("skywarden")
                .join("config.toml");
        }

        PathBuf::from("/tmp")
            .join(".config")
            .join("skywarden")
            .join("config.toml")
    }

    /// Validate the final configuration.
    fn validate_config(config: &MonitorConfig) -> Result<(), ConfigError> {
        if config.queue.max_batch_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "queue.max_batch_size must be greater than 0".to_owned(),
            });
        }

        if config.queue.debounce_seconds <= 0.0 || config.queue.max_age_seconds <= 0.0 {
            return Err(ConfigError::ValidationError {
                message: "queue debounce and max age must be positive".to_owned(),
            });
        }

        if config.detectors.deauth_threshold == 0 || config.detectors.deauth_window_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "detector threshold and window must be greater than 0".to_owned(),
            });
        }

        for (asset_type, tracker) in &config.trackers {
            if tracker.max_assets == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("trackers.{asset_type}.max_assets must be greater than 0"),
                });
            }
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError {
                    message: format!("unknown log level: {other}"),
                });
            }
        }

        Ok(())
    }
}
