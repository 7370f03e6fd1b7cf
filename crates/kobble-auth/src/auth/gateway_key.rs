//! Gateway public key resolver.
//!
//! Gateway tokens are signed with one well-known ECDSA P-256 key, served as
//! a PEM document together with the project id it is bound to. The key is
//! held in a single cache slot.

use crate::errors::VerifyError;
use kobble_common::cache::TtlCache;
use kobble_common::http::{get_json_as, JsonHttpClient};
use kobble_common::jwt::decode_public_key_pem;
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::spki::SubjectPublicKeyInfoRef;
use p256::pkcs8::{DecodePublicKey, ObjectIdentifier};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Gateway key cache TTL (15 minutes).
pub const GATEWAY_KEY_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Endpoint serving the gateway public key, relative to the SDK base URL.
pub const GATEWAY_KEY_PATH: &str = "/gateway/getPublicKey";

const CACHE_SLOT: &str = "default";

const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const RSA_ENCRYPTION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

const EXPECTED_KEY_TYPE: &str = "ECDSA P-256";

#[derive(Debug, Deserialize)]
struct GatewayKeyResponse {
    pem: String,
    project_id: String,
}

/// The gateway verification key and the project it is bound to.
#[derive(Debug, Clone)]
pub struct GatewayKey {
    verifying_key: VerifyingKey,
    project_id: String,
}

impl GatewayKey {
    /// Parse a PEM `PUBLIC KEY` block holding a P-256 key.
    ///
    /// # Errors
    ///
    /// - `UnknownSigningKey` - No usable PEM block or unparseable SPKI
    /// - `KeyTypeMismatch` - The key is not an ECDSA P-256 key
    pub fn from_pem(pem: &str, project_id: impl Into<String>) -> Result<Self, VerifyError> {
        let der = decode_public_key_pem(pem)?;

        let spki = SubjectPublicKeyInfoRef::try_from(der.as_slice()).map_err(|e| {
            VerifyError::UnknownSigningKey(format!("failed to parse public key: {e}"))
        })?;

        let oid = spki.algorithm.oid;
        if oid != EC_PUBLIC_KEY_OID {
            return Err(VerifyError::KeyTypeMismatch {
                expected: EXPECTED_KEY_TYPE,
                actual: key_type_name(oid),
            });
        }

        // EC key on some other curve
        let public_key = p256::PublicKey::from_public_key_der(&der).map_err(|_| {
            VerifyError::KeyTypeMismatch {
                expected: EXPECTED_KEY_TYPE,
                actual: "ECDSA (unsupported curve)".to_string(),
            }
        })?;

        Ok(Self {
            verifying_key: VerifyingKey::from(&public_key),
            project_id: project_id.into(),
        })
    }

    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Project id gateway tokens must carry as their audience.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

fn key_type_name(oid: ObjectIdentifier) -> String {
    if oid == RSA_ENCRYPTION_OID {
        "RSA".to_string()
    } else if oid == ED25519_OID {
        "Ed25519".to_string()
    } else {
        oid.to_string()
    }
}

/// Fetches and caches the gateway key.
pub struct GatewayKeyResolver {
    http: Arc<dyn JsonHttpClient>,
    cache: TtlCache<&'static str, Arc<GatewayKey>>,
}

impl GatewayKeyResolver {
    /// Create a resolver with the standard 15 minute TTL.
    pub fn new(http: Arc<dyn JsonHttpClient>) -> Self {
        Self::with_ttl(http, GATEWAY_KEY_CACHE_TTL)
    }

    /// Create a resolver with a custom TTL.
    pub fn with_ttl(http: Arc<dyn JsonHttpClient>, ttl: Duration) -> Self {
        Self {
            http,
            cache: TtlCache::with_default_ttl(ttl),
        }
    }

    /// Get the gateway key, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// - `UpstreamFetchFailed` - The endpoint failed or returned an unexpected body
    /// - `UnknownSigningKey` / `KeyTypeMismatch` - See [`GatewayKey::from_pem`]
    #[instrument(skip_all)]
    pub async fn resolve(&self) -> Result<Arc<GatewayKey>, VerifyError> {
        if let Some(key) = self.cache.get(&CACHE_SLOT) {
            tracing::debug!(target: "kobble.auth.gateway", "Gateway key cache hit");
            return Ok(key);
        }

        self.force_refresh().await
    }

    /// Fetch the gateway key and replace the cached one.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    #[instrument(skip_all)]
    pub async fn force_refresh(&self) -> Result<Arc<GatewayKey>, VerifyError> {
        tracing::debug!(target: "kobble.auth.gateway", "Fetching gateway public key");

        let response: GatewayKeyResponse = get_json_as(self.http.as_ref(), GATEWAY_KEY_PATH)
            .await
            .map_err(|e| {
                tracing::error!(target: "kobble.auth.gateway", error = %e, "Failed to fetch gateway public key");
                VerifyError::UpstreamFetchFailed {
                    context: "gateway public key",
                    source: e,
                }
            })?;

        let key = GatewayKey::from_pem(&response.pem, response.project_id).inspect_err(|e| {
            tracing::error!(target: "kobble.auth.gateway", error = %e, "Unusable gateway public key");
        })?;
        let key = Arc::new(key);

        tracing::info!(target: "kobble.auth.gateway", project_id = %key.project_id(), "Gateway key cache refreshed");

        self.cache.set(CACHE_SLOT, Arc::clone(&key), None);
        Ok(key)
    }

    /// Drop the cached key.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
