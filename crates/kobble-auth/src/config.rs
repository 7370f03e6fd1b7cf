//! SDK configuration.
//!
//! Configuration is loaded from environment variables or built
//! programmatically. The SDK secret is redacted in Debug output.

use crate::auth::gateway_key::GATEWAY_KEY_CACHE_TTL;
use crate::auth::jwks::JWKS_CACHE_TTL;
use crate::auth::project::PROJECT_CACHE_TTL;
use kobble_common::http::DEFAULT_HTTP_TIMEOUT;
use kobble_common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default SDK API base URL.
pub const DEFAULT_BASE_URL: &str = "https://sdk.kobble.io";

/// Upper bound for `KOBBLE_HTTP_TIMEOUT_SECONDS`.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 120;

pub const ENV_SDK_SECRET: &str = "KOBBLE_SDK_SECRET";
pub const ENV_BASE_URL: &str = "KOBBLE_BASE_URL";
pub const ENV_HTTP_TIMEOUT_SECONDS: &str = "KOBBLE_HTTP_TIMEOUT_SECONDS";
pub const ENV_PROJECT_CACHE_TTL_SECONDS: &str = "KOBBLE_PROJECT_CACHE_TTL_SECONDS";

/// SDK configuration.
#[derive(Clone)]
pub struct Config {
    /// Secret sent as `Kobble-Sdk-Secret` on every request.
    pub sdk_secret: SecretString,

    /// SDK API base URL (default: `https://sdk.kobble.io`).
    pub base_url: String,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,

    pub project_cache_ttl: Duration,

    /// Fixed at 15 minutes when loaded from the environment.
    pub jwks_cache_ttl: Duration,

    /// Fixed at 15 minutes when loaded from the environment.
    pub gateway_key_cache_ttl: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sdk_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("http_timeout", &self.http_timeout)
            .field("project_cache_ttl", &self.project_cache_ttl)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("gateway_key_cache_ttl", &self.gateway_key_cache_ttl)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid base URL configuration: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),

    #[error("Invalid project cache TTL configuration: {0}")]
    InvalidProjectCacheTtl(String),
}

impl Config {
    /// Configuration with the default base URL, timeout and TTLs.
    #[must_use]
    pub fn new(sdk_secret: impl Into<SecretString>) -> Self {
        Self {
            sdk_secret: sdk_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            project_cache_ttl: PROJECT_CACHE_TTL,
            jwks_cache_ttl: JWKS_CACHE_TTL,
            gateway_key_cache_ttl: GATEWAY_KEY_CACHE_TTL,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_project_cache_ttl(mut self, ttl: Duration) -> Self {
        self.project_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_gateway_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.gateway_key_cache_ttl = ttl;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Self::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the secret is missing or a value is invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let sdk_secret = vars
            .get(ENV_SDK_SECRET)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_SDK_SECRET.to_string()))?
            .clone();

        let base_url = vars
            .get(ENV_BASE_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "{ENV_BASE_URL} must start with http:// or https://, got '{base_url}'"
            )));
        }

        let http_timeout = if let Some(value_str) = vars.get(ENV_HTTP_TIMEOUT_SECONDS) {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "{ENV_HTTP_TIMEOUT_SECONDS} must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidHttpTimeout(format!(
                    "{ENV_HTTP_TIMEOUT_SECONDS} must be greater than 0"
                )));
            }

            if value > MAX_HTTP_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidHttpTimeout(format!(
                    "{ENV_HTTP_TIMEOUT_SECONDS} must not exceed {MAX_HTTP_TIMEOUT_SECONDS} seconds, got {value}"
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_HTTP_TIMEOUT
        };

        let project_cache_ttl = if let Some(value_str) = vars.get(ENV_PROJECT_CACHE_TTL_SECONDS) {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidProjectCacheTtl(format!(
                    "{ENV_PROJECT_CACHE_TTL_SECONDS} must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidProjectCacheTtl(format!(
                    "{ENV_PROJECT_CACHE_TTL_SECONDS} must be greater than 0"
                )));
            }

            Duration::from_secs(value)
        } else {
            PROJECT_CACHE_TTL
        };

        Ok(Self::new(sdk_secret)
            .with_base_url(base_url)
            .with_http_timeout(http_timeout)
            .with_project_cache_ttl(project_cache_ttl))
    }
}
