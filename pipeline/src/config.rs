//! Pipeline configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_STATE_DIR: &str = ".skilltrack";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// API server base URL without a trailing slash.
    pub api_url: String,
    /// Directory holding the persisted session and preference records.
    pub state_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl PipelineConfig {
    /// Config for `api_url` with every other field at its default.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_url(&api_url.into()),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `SKILLTRACK_API_URL`: default `http://127.0.0.1:8080`
    /// - `SKILLTRACK_STATE_DIR`: default `.skilltrack`
    /// - `SKILLTRACK_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SKILLTRACK_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting config fails [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("SKILLTRACK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let state_dir = std::env::var("SKILLTRACK_STATE_DIR").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_owned());

        let config = Self {
            api_url: normalize_url(&api_url),
            state_dir: PathBuf::from(state_dir),
            request_timeout_secs: env_parse("SKILLTRACK_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout_secs: env_parse("SKILLTRACK_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error for a non-HTTP base URL or an empty state directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme_ok = self.api_url.starts_with("http://") || self.api_url.starts_with("https://");
        let host_ok = self.api_url.split("://").nth(1).is_some_and(|rest| !rest.is_empty());
        if !scheme_ok || !host_ok {
            return Err(ConfigError::InvalidBaseUrl(self.api_url.clone()));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStateDir);
        }
        Ok(())
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
