//! Configuration management
//!
//! This module handles loading, validation, and management of the crmflow
//! configuration. Configuration is stored in TOML format at
//! ~/.crmflow/config.toml and is created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **execution**: Helper timeout and disabled helper types
//! - **connector**: Which CRM connector `crmflow run` binds to
//!
//! # Examples
//!
//! ```no_run
//! use crmflow_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Timeout: {}s", config.execution.timeout_secs);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Longest helper timeout accepted, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub connector: ConnectorConfig,
}

/// Core settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Helper execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound on one helper execution
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Helper types the executor refuses to run
    #[serde(default)]
    pub disabled_helpers: Vec<String>,
}

/// Connector implementation to bind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// In-memory store, optionally seeded from a JSON fixture
    #[default]
    Memory,
    /// Generic REST gateway
    Rest,
}

/// Connector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub kind: ConnectorKind,

    /// Platform slug reported by the connector and matched against
    /// helpers' supported platforms
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Gateway base URL (rest only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the bearer token (rest only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// JSON fixture seeding the memory connector (supports ~ expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_platform() -> String {
    "memory".to_string()
}

fn default_api_key_env() -> String {
    "CRMFLOW_API_KEY".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            disabled_helpers: Vec::new(),
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            kind: ConnectorKind::default(),
            platform: default_platform(),
            base_url: None,
            api_key_env: default_api_key_env(),
            fixture: None,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ConnectorConfig {
    /// Bearer token from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Config {
    /// Load configuration from the default location (~/.crmflow/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ConfigError> {
        Self::load_or_create_at(&Self::default_config_path()?)
    }

    /// Load configuration from `path`, writing defaults there when missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate_and_process()?;
        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut config = Self::default();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)?;
        fs::write(path, toml_string).map_err(write_error)?;

        Ok(config)
    }

    /// Default configuration file path (~/.crmflow/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".crmflow").join("config.toml"))
    }

    /// Validate fields and expand paths
    fn validate_and_process(&mut self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.execution.timeout_secs == 0 || self.execution.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be between 1 and {}",
                MAX_TIMEOUT_SECS
            )));
        }

        let registry = crate::registry::global();
        if let Some(unknown) = self
            .execution
            .disabled_helpers
            .iter()
            .find(|helper| !registry.is_registered(helper))
        {
            return Err(ConfigError::Invalid(format!(
                "disabled_helpers names unknown helper type '{}'",
                unknown
            )));
        }

        if self.connector.platform.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connector.platform must not be empty".to_string(),
            ));
        }

        if self.connector.kind == ConnectorKind::Rest {
            let base_url = self.connector.base_url.as_deref().unwrap_or("").trim();
            if base_url.is_empty() {
                return Err(ConfigError::Invalid(
                    "connector.base_url is required for the rest connector".to_string(),
                ));
            }
            url::Url::parse(base_url).map_err(|e| {
                ConfigError::Invalid(format!("connector.base_url '{}' is invalid: {}", base_url, e))
            })?;
        }

        if let Some(fixture) = &self.connector.fixture {
            self.connector.fixture = Some(expand_path(fixture)?);
        }

        Ok(())
    }
}

/// Expand a leading ~ to the user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ConfigError::Invalid("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir().ok_or(ConfigError::NoHomeDir)
    } else {
        Ok(path.to_path_buf())
    }
}
