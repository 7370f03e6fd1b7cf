//! Kobble SDK entry point.

use crate::auth::project::{fetch_whoami, Whoami};
use crate::auth::verifier::TokenVerifier;
use crate::config::{Config, ConfigError};
use kobble_common::http::{HttpError, JsonHttpClient, SdkHttpClient};
use std::sync::Arc;
use tracing::instrument;

/// Health endpoint, relative to the SDK base URL.
pub const PING_PATH: &str = "/ping";

/// Kobble SDK client.
///
/// Owns one HTTP client shared by every resolver, so keys and the project
/// id are cached for the lifetime of this value. Create it once and share it.
pub struct Kobble {
    http: Arc<SdkHttpClient>,
    verifier: TokenVerifier,
}

impl Kobble {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let http = Arc::new(SdkHttpClient::with_timeout(
            config.base_url.clone(),
            config.sdk_secret.clone(),
            config.http_timeout,
        ));
        let verifier = TokenVerifier::from_config(http.clone(), config);

        tracing::debug!(target: "kobble.client", base_url = %config.base_url, "Kobble client created");

        Self { http, verifier }
    }

    /// Build a client from `KOBBLE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the environment is incomplete or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(&Config::from_env()?))
    }

    /// The token verification service.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Look up the project and user the SDK secret belongs to.
    ///
    /// Always hits the network; the verifier keeps its own cached copy of
    /// the project id.
    ///
    /// # Errors
    ///
    /// Returns the underlying `HttpError`.
    #[instrument(skip_all)]
    pub async fn whoami(&self) -> Result<Whoami, HttpError> {
        fetch_whoami(self.http.as_ref()).await
    }

    /// Check the SDK API is reachable.
    ///
    /// `true` on any 2xx, whatever the body.
    #[instrument(skip_all)]
    pub async fn ping(&self) -> bool {
        match self.http.get_json(PING_PATH).await {
            Ok(_) | Err(HttpError::Decode(_)) => true,
            Err(e) => {
                tracing::warn!(target: "kobble.client", error = %e, "Ping failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for Kobble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kobble")
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}
