//! Configuration loading for the Outlay client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use outlay_sync::CacheConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    pub cache: CacheSettings,
    pub upload: UploadConfig,
    pub log: LogConfig,
}

/// Credentials forwarded on every API call. Both are optional: the API may
/// rely on a session established elsewhere.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub session_cookie: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub read_retries: u32,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    pub default_content_type: String,
    pub max_file_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Read `path`, then validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.cache.event_capacity == 0 {
            return Err(invalid("cache.event_capacity", "must be > 0"));
        }
        if self.upload.default_content_type.trim().is_empty() {
            return Err(invalid("upload.default_content_type", "must not be empty"));
        }
        if self.upload.max_file_bytes == 0 {
            return Err(invalid("upload.max_file_bytes", "must be > 0"));
        }
        if self.log.filter.trim().is_empty() {
            return Err(invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Read-path settings for the session cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_max_staleness(Duration::from_millis(self.cache.stale_time_ms))
            .with_read_retries(self.cache.read_retries)
            .with_event_capacity(self.cache.event_capacity)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
