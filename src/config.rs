//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::thresholds::{ThresholdError, ThresholdPair};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Threshold endpoint and fallback values
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_threshold_url")]
    pub url: String,

    #[serde(default = "default_threshold_enabled")]
    pub enabled: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_normal")]
    pub default_normal: i64,

    #[serde(default = "default_banjir")]
    pub default_banjir: i64,
}

fn default_threshold_url() -> String {
    "http://host.docker.internal:3000/api/level".to_string()
}

fn default_threshold_enabled() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_normal() -> i64 {
    100
}

fn default_banjir() -> i64 {
    80
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            url: default_threshold_url(),
            enabled: default_threshold_enabled(),
            request_timeout_ms: default_request_timeout(),
            default_normal: default_normal(),
            default_banjir: default_banjir(),
        }
    }
}

impl ThresholdsConfig {
    /// Fallback thresholds, validated
    pub fn defaults(&self) -> Result<ThresholdPair, ThresholdError> {
        ThresholdPair::new(self.default_normal, self.default_banjir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("banjir-relay").join("config.toml")),
            Some(PathBuf::from("/etc/banjir-relay/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds
            .defaults()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("BANJIR_RELAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BANJIR_RELAY_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        // Threshold overrides
        if let Some(url) = lookup("BANJIR_RELAY_THRESHOLD_URL") {
            self.thresholds.url = url;
        }

        // Logging overrides
        if let Some(level) = lookup("BANJIR_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BANJIR_RELAY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# banjir-relay Configuration
#
# Environment variables override these settings:
# - BANJIR_RELAY_HOST
# - BANJIR_RELAY_PORT
# - BANJIR_RELAY_THRESHOLD_URL
# - BANJIR_RELAY_LOG_LEVEL
# - BANJIR_RELAY_LOG_FORMAT

[server]
# Relay host
host = "0.0.0.0"

# Relay port
port = 8001

# Connections beyond this limit are closed right after the upgrade
max_connections = 1000

[thresholds]
# Endpoint returning {"Normal": int, "Banjir": int}
url = "http://host.docker.internal:3000/api/level"

# Fetch thresholds from the endpoint for each new connection
enabled = true

# Request timeout in milliseconds
request_timeout_ms = 5000

# Used when the endpoint is disabled or unreachable (banjir < normal)
default_normal = 100
default_banjir = 80

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
