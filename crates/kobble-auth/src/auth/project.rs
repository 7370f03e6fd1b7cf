//! Project identity resolver.
//!
//! The SDK secret belongs to exactly one project. Its id is looked up via
//! `GET /auth/whoami` and cached in a single slot, then used to locate the
//! project's JWKS document.

use crate::errors::VerifyError;
use kobble_common::cache::TtlCache;
use kobble_common::http::{get_json_as, HttpError, JsonHttpClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Project id cache TTL (50 minutes).
pub const PROJECT_CACHE_TTL: Duration = Duration::from_secs(50 * 60);

/// Identity endpoint, relative to the SDK base URL.
pub const WHOAMI_PATH: &str = "/auth/whoami";

const CACHE_SLOT: &str = "default";

/// Project and user the SDK secret is associated with.
///
/// `user_id` is the user that created the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whoami {
    #[serde(rename = "ProjectId")]
    pub project_id: String,

    #[serde(rename = "ProjectSlug", default)]
    pub project_slug: String,

    #[serde(rename = "UserId", default)]
    pub user_id: String,
}

/// Fetch the identity of the SDK secret, uncached.
///
/// # Errors
///
/// Returns the collaborator's `HttpError`.
pub async fn fetch_whoami(http: &dyn JsonHttpClient) -> Result<Whoami, HttpError> {
    get_json_as(http, WHOAMI_PATH).await
}

/// Resolves and caches the calling project's id.
pub struct ProjectResolver {
    http: Arc<dyn JsonHttpClient>,
    cache: TtlCache<&'static str, String>,
}

impl ProjectResolver {
    /// Create a resolver with the standard 50 minute TTL.
    pub fn new(http: Arc<dyn JsonHttpClient>) -> Self {
        Self::with_ttl(http, PROJECT_CACHE_TTL)
    }

    /// Create a resolver with a custom TTL.
    pub fn with_ttl(http: Arc<dyn JsonHttpClient>, ttl: Duration) -> Self {
        Self {
            http,
            cache: TtlCache::with_default_ttl(ttl),
        }
    }

    /// Get the project id, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::UpstreamFetchFailed` if the identity lookup fails.
    #[instrument(skip_all)]
    pub async fn project_id(&self) -> Result<String, VerifyError> {
        if let Some(project_id) = self.cache.get(&CACHE_SLOT) {
            tracing::debug!(target: "kobble.auth.project", "Project id cache hit");
            return Ok(project_id);
        }

        self.force_refresh().await
    }

    /// Look up the project id and replace the cached one.
    ///
    /// # Errors
    ///
    /// See [`Self::project_id`].
    #[instrument(skip_all)]
    pub async fn force_refresh(&self) -> Result<String, VerifyError> {
        let whoami = fetch_whoami(self.http.as_ref()).await.map_err(|e| {
            tracing::error!(target: "kobble.auth.project", error = %e, "Failed to resolve project id");
            VerifyError::UpstreamFetchFailed {
                context: "project identity",
                source: e,
            }
        })?;

        tracing::info!(target: "kobble.auth.project", project_id = %whoami.project_id, "Project id resolved");

        self.cache.set(CACHE_SLOT, whoami.project_id.clone(), None);
        Ok(whoami.project_id)
    }

    /// Drop the cached project id.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
