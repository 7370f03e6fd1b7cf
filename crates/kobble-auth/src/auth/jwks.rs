//! JWKS resolver for access and identity token keys.
//!
//! Fetches the project's JSON Web Key Set from the discovery endpoint and
//! caches the parsed RSA keys per URL with a fixed TTL.
//!
//! # Security
//!
//! - Only `kty = "RSA"` keys with decodable `n`/`e` enter a [`KeySet`];
//!   anything else is skipped with a warning
//! - A key set is immutable and replaced wholesale on refresh
//! - Keys are looked up by exact `kid`; there is no fallback key

use crate::errors::VerifyError;
use kobble_common::cache::TtlCache;
use kobble_common::http::{get_json_as, JsonHttpClient};
use kobble_common::jwt::decode_base64url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// JWKS cache TTL (15 minutes).
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Exponents wider than this cannot be represented and are rejected.
const MAX_EXPONENT_BYTES: usize = 8;

/// URL of the JWKS document for `project_id`.
#[must_use]
pub fn jwks_url(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/discovery/p/{project_id}/apps/keys",
        base_url.trim_end_matches('/')
    )
}

/// JSON Web Key from the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key ID - used to select the correct key for verification.
    /// Entries without one can never be selected and are skipped.
    #[serde(default)]
    pub kid: Option<String>,

    /// Key type (must be "RSA").
    #[serde(default)]
    pub kty: String,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Algorithm hint, not used for selection.
    #[serde(default)]
    pub alg: Option<String>,

    /// Modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// Public exponent (base64url, big-endian).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS response from the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// RSA public key material in the form `ring` consumes: minimal big-endian
/// modulus and exponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaVerificationKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

impl RsaVerificationKey {
    /// Build a key from an RSA JWK.
    ///
    /// The exponent is zero-left-padded to 4 bytes and read as a big-endian
    /// integer; negative or zero exponents are rejected.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::UnknownSigningKey` if the JWK is not RSA or its
    /// `n`/`e` cannot be decoded.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, VerifyError> {
        if jwk.kty != "RSA" {
            return Err(VerifyError::UnknownSigningKey(format!(
                "unsupported key type: {}",
                jwk.kty
            )));
        }

        let n_b64 = jwk
            .n
            .as_deref()
            .ok_or_else(|| VerifyError::UnknownSigningKey("JWK missing n".to_string()))?;
        let e_b64 = jwk
            .e
            .as_deref()
            .ok_or_else(|| VerifyError::UnknownSigningKey("JWK missing e".to_string()))?;

        let n = decode_base64url(n_b64)
            .map_err(|e| VerifyError::UnknownSigningKey(format!("invalid modulus: {e}")))?;
        let e = decode_base64url(e_b64)
            .map_err(|e| VerifyError::UnknownSigningKey(format!("invalid exponent: {e}")))?;

        Ok(Self {
            n: strip_leading_zeros(&n).to_vec(),
            e: parse_exponent(&e)?,
        })
    }

    /// Big-endian modulus without leading zero bytes.
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.n
    }

    /// Big-endian public exponent without leading zero bytes.
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.e
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(start..).unwrap_or_default()
}

/// Pad to at least 4 bytes, interpret as a signed 64-bit big-endian integer
/// and return its minimal big-endian encoding.
fn parse_exponent(raw: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let invalid = || VerifyError::UnknownSigningKey("invalid public exponent".to_string());

    let significant = strip_leading_zeros(raw);
    if significant.len() > MAX_EXPONENT_BYTES {
        return Err(invalid());
    }

    let mut padded = [0u8; MAX_EXPONENT_BYTES];
    let offset = MAX_EXPONENT_BYTES - significant.len();
    padded
        .get_mut(offset..)
        .ok_or_else(invalid)?
        .copy_from_slice(significant);

    let value = i64::from_be_bytes(padded);
    if value <= 0 {
        return Err(invalid());
    }

    Ok(strip_leading_zeros(&value.to_be_bytes()).to_vec())
}

/// Immutable map from key id to RSA key.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, RsaVerificationKey>,
}

impl KeySet {
    /// Build a key set, skipping entries that are not usable RSA keys.
    #[must_use]
    pub fn from_jwks(jwks: &JwksResponse) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| {
                let Some(kid) = jwk.kid.as_deref() else {
                    tracing::warn!(target: "kobble.auth.jwks", kty = %jwk.kty, "Skipping JWK without kid");
                    return None;
                };
                match RsaVerificationKey::from_jwk(jwk) {
                    Ok(key) => Some((kid.to_string(), key)),
                    Err(e) => {
                        tracing::warn!(
                            target: "kobble.auth.jwks",
                            kid = %kid,
                            kty = %jwk.kty,
                            error = %e,
                            "Skipping unusable JWK"
                        );
                        None
                    }
                }
            })
            .collect();

        Self { keys }
    }

    /// Key by exact `kid`.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&RsaVerificationKey> {
        self.keys.get(kid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All key ids, unordered.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// Fetches and caches key sets per JWKS URL.
pub struct JwksResolver {
    http: Arc<dyn JsonHttpClient>,
    cache: TtlCache<String, Arc<KeySet>>,
    ttl: Duration,
}

impl JwksResolver {
    /// Create a resolver with the standard 15 minute TTL.
    pub fn new(http: Arc<dyn JsonHttpClient>) -> Self {
        Self::with_ttl(http, JWKS_CACHE_TTL)
    }

    /// Create a resolver with a custom TTL.
    pub fn with_ttl(http: Arc<dyn JsonHttpClient>, ttl: Duration) -> Self {
        Self {
            http,
            cache: TtlCache::with_default_ttl(ttl),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the key set for `url`, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::UpstreamFetchFailed` if the document cannot be
    /// fetched or parsed.
    #[instrument(skip(self))]
    pub async fn resolve(&self, url: &str) -> Result<Arc<KeySet>, VerifyError> {
        if let Some(keys) = self.cache.get(&url.to_string()) {
            tracing::debug!(target: "kobble.auth.jwks", "JWKS cache hit");
            return Ok(keys);
        }

        self.force_refresh(url).await
    }

    /// Fetch the key set for `url` and replace the cached one.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    #[instrument(skip(self))]
    pub async fn force_refresh(&self, url: &str) -> Result<Arc<KeySet>, VerifyError> {
        tracing::debug!(target: "kobble.auth.jwks", "Fetching JWKS");

        let jwks: JwksResponse = get_json_as(self.http.as_ref(), url).await.map_err(|e| {
            tracing::error!(target: "kobble.auth.jwks", error = %e, "Failed to fetch JWKS");
            VerifyError::UpstreamFetchFailed {
                context: "JWKS",
                source: e,
            }
        })?;

        let keys = Arc::new(KeySet::from_jwks(&jwks));

        tracing::info!(
            target: "kobble.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        self.cache.set(url.to_string(), Arc::clone(&keys), None);
        Ok(keys)
    }

    /// Drop every cached key set.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
