//! Token verification service.
//!
//! Two fixed pipelines, each failing fast on the first error:
//!
//! ```text
//! access / identity:  project id -> JWKS -> decode -> claims -> RSA signature (by kid)
//! gateway:            gateway key -> decode -> claims -> ES256 signature
//! ```
//!
//! The first step failure is wrapped into the flow's [`AuthError`] variant.
//! Nothing is retried.

use crate::auth::claims::{
    AccessTokenClaims, GatewayTokenClaims, IdentityTokenClaims, VerifyAccessTokenResult,
    VerifyIdTokenResult,
};
use crate::auth::gateway_key::GatewayKeyResolver;
use crate::auth::jwks::{jwks_url, JwksResolver};
use crate::auth::project::ProjectResolver;
use crate::auth::signature::{ensure_gateway_algorithm, rsa_parameters, verify_es256, verify_rsa};
use crate::auth::validation::{
    check_audience, check_expiration_at, check_issued_at_at, check_issuer, check_not_before_at,
    check_required, unix_now, VerificationOptions,
};
use crate::config::Config;
use crate::errors::{AuthError, VerifyError};
use kobble_common::http::JsonHttpClient;
use kobble_common::jwt::{decode_header, decode_payload, split_token};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

/// Issuer of access and identity tokens.
pub const ACCESS_TOKEN_ISSUER: &str = "https://kobble.io";

/// Issuer of gateway tokens.
pub const GATEWAY_TOKEN_ISSUER: &str = "gateway.kobble.io";

pub const ACCESS_TOKEN_REQUIRED_CLAIMS: &[&str] = &["sub", "project_id", "exp", "iss", "aud"];

pub const ID_TOKEN_REQUIRED_CLAIMS: &[&str] = &["sub", "id", "exp", "iss", "aud"];

/// Required on every gateway token, whichever checks are toggled.
pub const GATEWAY_TOKEN_REQUIRED_CLAIMS: &[&str] = &["iat", "exp", "iss", "sub", "aud", "user"];

/// Which JWKS-signed token is being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Identity,
}

impl TokenKind {
    fn required_claims(self) -> &'static [&'static str] {
        match self {
            TokenKind::Access => ACCESS_TOKEN_REQUIRED_CLAIMS,
            TokenKind::Identity => ID_TOKEN_REQUIRED_CLAIMS,
        }
    }

    fn wrap(self, cause: VerifyError) -> AuthError {
        match self {
            TokenKind::Access => AuthError::AccessTokenVerificationFailed(cause),
            TokenKind::Identity => AuthError::IdTokenVerificationFailed(cause),
        }
    }
}

/// Result of [`TokenVerifier::verify_access_or_identity_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedToken {
    Access(VerifyAccessTokenResult),
    Identity(VerifyIdTokenResult),
}

/// Verifies access, identity and gateway tokens.
///
/// Safe to share across tasks; every resolver guards its own cache.
pub struct TokenVerifier {
    base_url: String,
    projects: ProjectResolver,
    jwks: JwksResolver,
    gateway_keys: GatewayKeyResolver,
}

impl TokenVerifier {
    /// Create a verifier with the standard cache TTLs.
    pub fn new(http: Arc<dyn JsonHttpClient>, base_url: impl Into<String>) -> Self {
        Self::from_parts(
            base_url,
            ProjectResolver::new(Arc::clone(&http)),
            JwksResolver::new(Arc::clone(&http)),
            GatewayKeyResolver::new(http),
        )
    }

    /// Create a verifier using the base URL and cache TTLs from `config`.
    pub fn from_config(http: Arc<dyn JsonHttpClient>, config: &Config) -> Self {
        Self::from_parts(
            config.base_url.clone(),
            ProjectResolver::with_ttl(Arc::clone(&http), config.project_cache_ttl),
            JwksResolver::with_ttl(Arc::clone(&http), config.jwks_cache_ttl),
            GatewayKeyResolver::with_ttl(http, config.gateway_key_cache_ttl),
        )
    }

    /// Assemble a verifier from explicitly built resolvers.
    pub fn from_parts(
        base_url: impl Into<String>,
        projects: ProjectResolver,
        jwks: JwksResolver,
        gateway_keys: GatewayKeyResolver,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            projects,
            jwks,
            gateway_keys,
        }
    }

    #[must_use]
    pub fn projects(&self) -> &ProjectResolver {
        &self.projects
    }

    #[must_use]
    pub fn jwks(&self) -> &JwksResolver {
        &self.jwks
    }

    #[must_use]
    pub fn gateway_keys(&self) -> &GatewayKeyResolver {
        &self.gateway_keys
    }

    /// Drop every cached key and the cached project id.
    pub fn clear_caches(&self) {
        self.projects.clear();
        self.jwks.clear();
        self.gateway_keys.clear();
    }

    /// Verify an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccessTokenVerificationFailed` wrapping the first
    /// failed step.
    #[instrument(skip_all)]
    pub async fn verify_access_token(
        &self,
        token: &str,
        options: &VerificationOptions,
    ) -> Result<VerifyAccessTokenResult, AuthError> {
        let kind = TokenKind::Access;
        let claims: AccessTokenClaims = self
            .verify_jwks_token(token, kind, options)
            .await
            .map_err(|e| kind.wrap(e))?;

        tracing::debug!(target: "kobble.auth.verifier", "Access token verified");
        Ok(VerifyAccessTokenResult::from(claims))
    }

    /// Verify an identity token and normalize its user profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::IdTokenVerificationFailed` wrapping the first
    /// failed step.
    #[instrument(skip_all)]
    pub async fn verify_id_token(
        &self,
        token: &str,
        options: &VerificationOptions,
    ) -> Result<VerifyIdTokenResult, AuthError> {
        let kind = TokenKind::Identity;
        let result = self
            .verify_jwks_token::<IdentityTokenClaims>(token, kind, options)
            .await
            .and_then(VerifyIdTokenResult::try_from)
            .map_err(|e| kind.wrap(e))?;

        tracing::debug!(target: "kobble.auth.verifier", "ID token verified");
        Ok(result)
    }

    /// Verify a JWKS-signed token of the given kind.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_access_token`] and [`Self::verify_id_token`].
    pub async fn verify_access_or_identity_token(
        &self,
        token: &str,
        kind: TokenKind,
        options: &VerificationOptions,
    ) -> Result<VerifiedToken, AuthError> {
        match kind {
            TokenKind::Access => self
                .verify_access_token(token, options)
                .await
                .map(VerifiedToken::Access),
            TokenKind::Identity => self
                .verify_id_token(token, options)
                .await
                .map(VerifiedToken::Identity),
        }
    }

    /// Verify a gateway-forwarded token.
    ///
    /// `options.issuer` and `options.audience` are ignored: the issuer is
    /// always [`GATEWAY_TOKEN_ISSUER`] and the audience is the project the
    /// gateway key is bound to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::GatewayTokenVerificationFailed` wrapping the first
    /// failed step.
    #[instrument(skip_all)]
    pub async fn verify_gateway_token(
        &self,
        token: &str,
        options: &VerificationOptions,
    ) -> Result<GatewayTokenClaims, AuthError> {
        let claims = self
            .verify_gateway_token_inner(token, options)
            .await
            .map_err(AuthError::GatewayTokenVerificationFailed)?;

        tracing::debug!(target: "kobble.auth.verifier", "Gateway token verified");
        Ok(claims)
    }

    async fn verify_jwks_token<T: DeserializeOwned>(
        &self,
        token: &str,
        kind: TokenKind,
        options: &VerificationOptions,
    ) -> Result<T, VerifyError> {
        let project_id = self.projects.project_id().await?;
        let keys = self
            .jwks
            .resolve(&jwks_url(&self.base_url, &project_id))
            .await?;

        let segments = split_token(token)?;
        let header = decode_header(segments.header)?;
        // Algorithm family is enforced even with signature checks off
        rsa_parameters(&header.alg)?;

        let claims = decode_payload(segments.payload)?;
        let now = unix_now();

        check_required(&claims, kind.required_claims())?;
        if options.verify_expiration {
            check_expiration_at(&claims, now)?;
            check_not_before_at(&claims, now)?;
            check_issued_at_at(&claims, now)?;
        }
        if options.verify_audience {
            check_audience(&claims, options.audience.as_deref().unwrap_or(&project_id))?;
        }
        if options.verify_issuer {
            check_issuer(
                &claims,
                options.issuer.as_deref().unwrap_or(ACCESS_TOKEN_ISSUER),
            )?;
        }
        if options.verify_signature {
            verify_rsa(&segments, &header, &keys)?;
        } else {
            tracing::warn!(target: "kobble.auth.verifier", "Signature verification skipped");
        }

        materialize(claims)
    }

    async fn verify_gateway_token_inner(
        &self,
        token: &str,
        options: &VerificationOptions,
    ) -> Result<GatewayTokenClaims, VerifyError> {
        let key = self.gateway_keys.resolve().await?;

        let segments = split_token(token)?;
        let header = decode_header(segments.header)?;
        ensure_gateway_algorithm(&header.alg)?;

        let claims = decode_payload(segments.payload)?;

        check_required(&claims, GATEWAY_TOKEN_REQUIRED_CLAIMS)?;
        if options.verify_expiration {
            check_expiration_at(&claims, unix_now())?;
        }
        if options.verify_audience {
            check_audience(&claims, key.project_id())?;
        }
        if options.verify_issuer {
            check_issuer(&claims, GATEWAY_TOKEN_ISSUER)?;
        }
        if options.verify_signature {
            verify_es256(&segments, &header, &key)?;
        } else {
            tracing::warn!(target: "kobble.auth.verifier", "Signature verification skipped");
        }

        let mut typed: GatewayTokenClaims = materialize(claims)?;
        if typed.project_id.is_empty() {
            typed.project_id.clone_from(&typed.aud);
        }
        Ok(typed)
    }
}

fn materialize<T: DeserializeOwned>(claims: Map<String, Value>) -> Result<T, VerifyError> {
    serde_json::from_value(Value::Object(claims)).map_err(|e| {
        tracing::debug!(target: "kobble.auth.verifier", error = %e, "Claims do not match the expected shape");
        VerifyError::MalformedToken(format!("Invalid token claims: {e}"))
    })
}
