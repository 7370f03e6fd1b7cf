//! HTTP collaborator used by every resolver.
//!
//! Resolvers never talk to `reqwest` directly. They depend on the
//! [`JsonHttpClient`] trait so tests can inject a counting mock and
//! embedding applications can route SDK traffic through their own client.
//!
//! [`SdkHttpClient`] is the default implementation:
//!
//! - Relative paths (`/auth/whoami`) are joined to the configured base URL
//! - Absolute `http(s)://` URLs are requested verbatim
//! - Every request carries the `Kobble-Sdk-Secret` header and a `User-Agent`
//! - Non-2xx responses become [`HttpError::Status`]
//! - No retries: retry policy belongs to the caller

use crate::secret::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

// =============================================================================
// Constants
// =============================================================================

/// Header carrying the SDK secret on every request.
pub const SDK_SECRET_HEADER: &str = "Kobble-Sdk-Secret";

/// `User-Agent` sent by [`SdkHttpClient`].
pub const USER_AGENT: &str = concat!("Kobble Rust SDK/", env!("CARGO_PKG_VERSION"));

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error bodies are truncated to this many bytes before being kept.
const MAX_ERROR_BODY_BYTES: usize = 512;

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned by a [`JsonHttpClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The server answered with a non-2xx status.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body is not the expected JSON.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

// =============================================================================
// Trait
// =============================================================================

/// Generic "GET JSON" capability.
#[async_trait::async_trait]
pub trait JsonHttpClient: Send + Sync {
    /// Issue a GET and return the decoded JSON body of a 2xx response.
    ///
    /// `path` is either relative to the client's base URL or an absolute URL.
    async fn get_json(&self, path: &str) -> Result<Value, HttpError>;
}

/// GET `path` and deserialize the body into `T`.
///
/// # Errors
///
/// Returns the client's `HttpError`, or `HttpError::Decode` if the body does
/// not match `T`.
pub async fn get_json_as<T>(client: &dyn JsonHttpClient, path: &str) -> Result<T, HttpError>
where
    T: DeserializeOwned,
{
    let value = client.get_json(path).await?;
    serde_json::from_value(value).map_err(|e| HttpError::Decode(e.to_string()))
}

// =============================================================================
// reqwest implementation
// =============================================================================

/// `reqwest`-backed [`JsonHttpClient`] authenticated with the SDK secret.
pub struct SdkHttpClient {
    base_url: String,
    secret: SecretString,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for SdkHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkHttpClient")
            .field("base_url", &self.base_url)
            .field("secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SdkHttpClient {
    /// Create a client with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret: SecretString) -> Self {
        Self::with_timeout(base_url, secret, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, secret: SecretString, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "kobble.http", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into(),
            secret,
            http_client,
        }
    }

    /// The base URL relative paths are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path` against the base URL unless it is already absolute.
    #[must_use]
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl JsonHttpClient for SdkHttpClient {
    #[instrument(skip(self))]
    async fn get_json(&self, path: &str) -> Result<Value, HttpError> {
        let url = self.resolve_url(path);

        tracing::debug!(target: "kobble.http", url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .header(SDK_SECRET_HEADER, self.secret.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(target: "kobble.http", error = %e, "HTTP request failed");
                HttpError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                tracing::trace!(target: "kobble.http", error = %e, "Failed to read error response body");
                String::new()
            });
            tracing::warn!(
                target: "kobble.http",
                status = %status,
                url = %url,
                "Unexpected response status"
            );
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            tracing::warn!(target: "kobble.http", error = %e, "Failed to parse JSON response");
            HttpError::Decode(e.to_string())
        })
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut cut = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

// =============================================================================
// Tests
// =============================================================================
