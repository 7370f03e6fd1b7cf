//! Typed claims and verification results.
//!
//! Claims structs are materialized from the validated payload after every
//! check has passed. User identifiers (`sub`, `id`, `email`) are redacted in
//! Debug output to keep them out of logs.

use crate::errors::VerifyError;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Legacy timestamp layout, as produced by JavaScript's `Date.toString()`.
const LEGACY_DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

// =============================================================================
// Access tokens
// =============================================================================

/// Claims of a Kobble access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Project the token was issued for.
    pub project_id: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,
}

impl fmt::Debug for AccessTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenClaims")
            .field("sub", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .finish()
    }
}

/// Successful access token verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyAccessTokenResult {
    pub user_id: String,
    pub project_id: String,
    pub claims: AccessTokenClaims,
}

impl From<AccessTokenClaims> for VerifyAccessTokenResult {
    fn from(claims: AccessTokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            project_id: claims.project_id.clone(),
            claims,
        }
    }
}

// =============================================================================
// Identity tokens
// =============================================================================

/// Claims of a Kobble identity (ID) token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTokenClaims {
    /// Subject - redacted in Debug output.
    pub sub: String,

    /// User id - redacted in Debug output.
    pub id: String,

    /// Email - redacted in Debug output.
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub picture_url: String,

    #[serde(default)]
    pub is_verified: bool,

    #[serde(default)]
    pub stripe_id: String,

    #[serde(default)]
    pub updated_at: String,

    #[serde(default)]
    pub created_at: String,

    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    pub iss: String,

    pub aud: String,
}

impl fmt::Debug for IdentityTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityTokenClaims")
            .field("sub", &"[REDACTED]")
            .field("id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("is_verified", &self.is_verified)
            .field("updated_at", &self.updated_at)
            .field("created_at", &self.created_at)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .finish_non_exhaustive()
    }
}

/// User profile carried by an identity token, timestamps in RFC 3339.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct IdTokenUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture_url: String,
    pub is_verified: bool,
    pub stripe_id: String,
    pub updated_at: String,
    pub created_at: String,
}

impl fmt::Debug for IdTokenUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdTokenUser")
            .field("id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("is_verified", &self.is_verified)
            .field("updated_at", &self.updated_at)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Successful identity token verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyIdTokenResult {
    pub user_id: String,
    pub user: IdTokenUser,
    pub claims: IdentityTokenClaims,
}

impl TryFrom<IdentityTokenClaims> for VerifyIdTokenResult {
    type Error = VerifyError;

    fn try_from(claims: IdentityTokenClaims) -> Result<Self, Self::Error> {
        let user = IdTokenUser {
            id: claims.id.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            picture_url: claims.picture_url.clone(),
            is_verified: claims.is_verified,
            stripe_id: claims.stripe_id.clone(),
            updated_at: normalize_claims_date(&claims.updated_at)?,
            created_at: normalize_claims_date(&claims.created_at)?,
        };

        Ok(Self {
            user_id: claims.sub.clone(),
            user,
            claims,
        })
    }
}

/// Normalize an identity token timestamp to RFC 3339.
///
/// Accepts RFC 3339 as-is and the legacy
/// `"Mon Jan 2 2006 15:04:05 GMT-0700 (Zone Name)"` layout.
///
/// # Errors
///
/// Returns `VerifyError::MalformedToken` for any other input.
pub fn normalize_claims_date(date: &str) -> Result<String, VerifyError> {
    if DateTime::parse_from_rfc3339(date).is_ok() {
        return Ok(date.to_string());
    }

    // Drop the trailing "(Coordinated Universal Time)" style zone name
    let trimmed = match date.find(" (") {
        Some(idx) if date.ends_with(')') => date.get(..idx).unwrap_or(date),
        _ => date,
    };

    DateTime::parse_from_str(trimmed, LEGACY_DATE_FORMAT)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .map_err(|e| {
            tracing::debug!(target: "kobble.auth.verifier", error = %e, "Unparseable date claim");
            VerifyError::MalformedToken(format!("failed to parse date: {e}"))
        })
}

// =============================================================================
// Gateway tokens
// =============================================================================

/// Claims of a gateway-forwarded token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTokenClaims {
    /// Project id; filled from `aud` when the payload omits it.
    #[serde(default)]
    pub project_id: String,

    /// Subject - redacted in Debug output.
    pub sub: String,

    pub iat: i64,

    pub exp: i64,

    pub iss: String,

    pub aud: String,

    pub user: GatewayUser,
}

impl fmt::Debug for GatewayTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayTokenClaims")
            .field("project_id", &self.project_id)
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("user", &self.user)
            .finish()
    }
}

/// End user the gateway authenticated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUser {
    pub id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub products: Vec<GatewayProduct>,
}

impl fmt::Debug for GatewayUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayUser")
            .field("id", &self.id)
            .field("email", &"[REDACTED]")
            .field("products", &self.products)
            .finish_non_exhaustive()
    }
}

/// A product the user is entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayProduct {
    pub id: String,

    #[serde(default)]
    pub quotas: Vec<GatewayQuota>,
}

/// Usage of one quota at the time the token was minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayQuota {
    pub id: String,
    pub name: String,
    pub used: i64,
    pub limit: i64,
}

impl GatewayTokenClaims {
    /// Quota by name across every product, if the user has it.
    #[must_use]
    pub fn quota(&self, name: &str) -> Option<&GatewayQuota> {
        self.user
            .products
            .iter()
            .flat_map(|product| product.quotas.iter())
            .find(|quota| quota.name == name)
    }

    /// Returns `true` if the user is entitled to `product_id`.
    #[must_use]
    pub fn has_product(&self, product_id: &str) -> bool {
        self.user.products.iter().any(|p| p.id == product_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn access_claims() -> AccessTokenClaims {
        AccessTokenClaims {
            sub: "secret-user-id".to_string(),
            project_id: "p1".to_string(),
            exp: 9_999_999_999,
            iat: Some(1),
            nbf: None,
            iss: "https://kobble.io".to_string(),
            aud: "p1".to_string(),
        }
    }

    #[test]
    fn test_access_claims_debug_redacts_sub() {
        let debug_str = format!("{:?}", access_claims());
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("p1"));
    }

    #[test]
    fn test_access_result_from_claims() {
        let result = VerifyAccessTokenResult::from(access_claims());
        assert_eq!(result.user_id, "secret-user-id");
        assert_eq!(result.project_id, "p1");
    }

    #[test]
    fn test_access_claims_optional_timestamps() {
        let claims: AccessTokenClaims = serde_json::from_value(json!({
            "sub": "u1",
            "project_id": "p1",
            "exp": 10,
            "iss": "https://kobble.io",
            "aud": "p1"
        }))
        .unwrap();
        assert!(claims.iat.is_none());
        assert!(claims.nbf.is_none());
    }

    #[test]
    fn test_normalize_legacy_date() {
        let normalized =
            normalize_claims_date("Tue Mar 05 2024 10:15:30 GMT+0000 (Coordinated Universal Time)")
                .unwrap();
        assert_eq!(normalized, "2024-03-05T10:15:30Z");
    }

    #[test]
    fn test_normalize_legacy_date_with_offset() {
        let normalized = normalize_claims_date("Mon Jan 2 2006 15:04:05 GMT-0700").unwrap();
        assert_eq!(normalized, "2006-01-02T15:04:05-07:00");
    }

    #[test]
    fn test_normalize_rfc3339_passthrough() {
        let date = "2024-03-05T10:15:30Z";
        assert_eq!(normalize_claims_date(date).unwrap(), date);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(
            normalize_claims_date("yesterday"),
            Err(VerifyError::MalformedToken(_))
        ));
        assert!(normalize_claims_date("").is_err());
    }

    #[test]
    fn test_id_result_normalizes_dates() {
        let claims: IdentityTokenClaims = serde_json::from_value(json!({
            "sub": "u1",
            "id": "u1",
            "email": "alice@example.com",
            "name": "Alice",
            "picture_url": "",
            "is_verified": true,
            "stripe_id": "cus_1",
            "updated_at": "Tue Mar 05 2024 10:15:30 GMT+0000 (Coordinated Universal Time)",
            "created_at": "2024-01-01T08:00:00Z",
            "exp": 10,
            "iss": "https://kobble.io",
            "aud": "p1"
        }))
        .unwrap();

        let result = VerifyIdTokenResult::try_from(claims).unwrap();
        assert_eq!(result.user_id, "u1");
        assert_eq!(result.user.updated_at, "2024-03-05T10:15:30Z");
        assert_eq!(result.user.created_at, "2024-01-01T08:00:00Z");
        assert!(!format!("{:?}", result.user).contains("alice@example.com"));
    }

    #[test]
    fn test_gateway_claims_helpers() {
        let claims: GatewayTokenClaims = serde_json::from_value(json!({
            "project_id": "p1",
            "sub": "u1",
            "iat": 1,
            "exp": 2,
            "iss": "gateway.kobble.io",
            "aud": "p1",
            "user": {
                "id": "u1",
                "email": "alice@example.com",
                "name": null,
                "products": [{
                    "id": "prod_1",
                    "quotas": [{"id": "q1", "name": "api-calls", "used": 3, "limit": 100}]
                }]
            }
        }))
        .unwrap();

        assert!(claims.has_product("prod_1"));
        assert!(!claims.has_product("prod_2"));
        assert_eq!(claims.quota("api-calls").unwrap().limit, 100);
        assert!(claims.user.name.is_none());
        assert!(!format!("{claims:?}").contains("alice@example.com"));
    }
}
