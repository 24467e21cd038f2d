use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::capabilities::{ValidatedUrl, MAX_TIMEOUT_MS};
use crate::{DEFAULT_AUTH_HEADER, DEFAULT_BASE_URL, FAVORITES_TITLE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the gallery API; always stored with a trailing slash.
    pub base_url: String,
    /// Title the server gives the favorites category.
    pub favorites_title: String,
    /// Header carrying the session token.
    pub auth_header: String,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            favorites_title: FAVORITES_TITLE.to_string(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::new(self.base_url.as_str())
            .map_err(|e| ConfigError::Validation(format!("base_url: {e}")))?;
        if self.favorites_title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "favorites_title must not be empty".into(),
            ));
        }
        if self.auth_header.is_empty()
            || !self
                .auth_header
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "auth_header '{}' is not a valid header name",
                self.auth_header
            )));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Validation(format!(
                "request_timeout_ms must be in 1..={MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Validated base URL, normalised so relative endpoints resolve beneath it.
    pub fn base_url(&self) -> Result<ValidatedUrl, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        ValidatedUrl::new(raw).map_err(|e| ConfigError::Validation(format!("base_url: {e}")))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
