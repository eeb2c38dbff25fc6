//! Configuration management
//!
//! This module handles loading and parsing configuration for the session
//! subsystem. Configuration can be loaded from:
//! - a YAML config file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Auth backend configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Token/session storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Proactive refresh configuration
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Auth backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.mojeeb.ai".to_string()
}

fn default_timeout() -> u64 {
    15
}

/// Token/session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the storage file; in-memory only when unset
    #[serde(default = "default_storage_path")]
    pub path: Option<String>,
    /// Operator-supplied encryption secret. When unset, the encryption key
    /// is derived from a device fingerprint instead (weaker: it only ties
    /// the file to the machine it was written on).
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            secret: None,
        }
    }
}

fn default_storage_path() -> Option<String> {
    Some("data/session.json".to_string())
}

/// Proactive refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Documented lifetime of an access token in seconds (15 minutes)
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_seconds: u64,
    /// Explicit scheduler interval in seconds. When unset, the interval is
    /// 80% of the access token lifetime, leaving margin for clock skew and
    /// network latency before the token actually expires.
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_seconds: default_access_token_ttl(),
            interval_seconds: None,
        }
    }
}

fn default_access_token_ttl() -> u64 {
    900
}

impl RefreshConfig {
    /// Effective scheduler interval: the explicit setting, or 80% of the
    /// access token lifetime (12 minutes for the default 15-minute token).
    pub fn interval(&self) -> Duration {
        let seconds = self
            .interval_seconds
            .unwrap_or(self.access_token_ttl_seconds * 4 / 5);
        Duration::from_secs(seconds)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - MOJEEB_AUTH_BASE_URL
    /// - MOJEEB_AUTH_TIMEOUT_SECONDS
    /// - MOJEEB_STORAGE_PATH
    /// - MOJEEB_STORAGE_SECRET
    /// - MOJEEB_REFRESH_ACCESS_TOKEN_TTL_SECONDS
    /// - MOJEEB_REFRESH_INTERVAL_SECONDS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("MOJEEB_AUTH_BASE_URL") {
            self.auth.base_url = base_url;
        }
        if let Ok(timeout) = std::env::var("MOJEEB_AUTH_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.auth.timeout_seconds = timeout;
            }
        }

        if let Ok(path) = std::env::var("MOJEEB_STORAGE_PATH") {
            self.storage.path = if path.is_empty() { None } else { Some(path) };
        }
        if let Ok(secret) = std::env::var("MOJEEB_STORAGE_SECRET") {
            self.storage.secret = Some(secret);
        }

        if let Ok(ttl) = std::env::var("MOJEEB_REFRESH_ACCESS_TOKEN_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.refresh.access_token_ttl_seconds = ttl;
            }
        }
        if let Ok(interval) = std::env::var("MOJEEB_REFRESH_INTERVAL_SECONDS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.refresh.interval_seconds = Some(interval);
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
