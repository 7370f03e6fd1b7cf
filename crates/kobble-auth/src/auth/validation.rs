//! Claim validation.
//!
//! Each check is independent and operates on the raw claim map, before any
//! typed materialization. Time checks use second resolution with no clock
//! skew leeway; every time check has an `_at` variant taking an explicit
//! "now" for deterministic tests.

use crate::errors::VerifyError;
use serde_json::{Map, Value};

/// Which checks a verification call runs.
///
/// All checks are enabled by default. `issuer` and `audience` override the
/// expected values of the access/identity flow; the gateway flow always
/// compares against its own fixed issuer and the resolved key's project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOptions {
    pub verify_issuer: bool,
    pub verify_audience: bool,
    pub verify_expiration: bool,
    pub verify_signature: bool,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            verify_issuer: true,
            verify_audience: true,
            verify_expiration: true,
            verify_signature: true,
            issuer: None,
            audience: None,
        }
    }
}

impl VerificationOptions {
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn skip_issuer(mut self) -> Self {
        self.verify_issuer = false;
        self
    }

    #[must_use]
    pub fn skip_audience(mut self) -> Self {
        self.verify_audience = false;
        self
    }

    #[must_use]
    pub fn skip_expiration(mut self) -> Self {
        self.verify_expiration = false;
        self
    }

    /// Skip signature verification. Never do this outside of tests.
    #[must_use]
    pub fn skip_signature(mut self) -> Self {
        self.verify_signature = false;
        self
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Fail with every name in `names` that is absent from `claims`.
///
/// # Errors
///
/// Returns `VerifyError::MissingClaims` listing all missing names in order.
pub fn check_required(claims: &Map<String, Value>, names: &[&str]) -> Result<(), VerifyError> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !claims.contains_key(**name))
        .map(|name| (*name).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!(target: "kobble.auth.verifier", missing = ?missing, "Token rejected: missing required claims");
        Err(VerifyError::MissingClaims(missing))
    }
}

/// Check `exp` against the current time.
///
/// # Errors
///
/// See [`check_expiration_at`].
pub fn check_expiration(claims: &Map<String, Value>) -> Result<(), VerifyError> {
    check_expiration_at(claims, unix_now())
}

/// Check `exp` against `now`. A token is still valid during the second it
/// expires.
///
/// # Errors
///
/// - `MalformedToken` - `exp` is missing or not a number
/// - `Expired` - `now > exp`
pub fn check_expiration_at(claims: &Map<String, Value>, now: i64) -> Result<(), VerifyError> {
    let exp = numeric_claim(claims, "exp")
        .ok_or_else(|| VerifyError::MalformedToken("Missing or invalid exp claim".to_string()))?;

    if now > exp {
        tracing::debug!(target: "kobble.auth.verifier", exp = exp, now = now, "Token rejected: expired");
        return Err(VerifyError::Expired { exp, now });
    }

    Ok(())
}

/// Check `nbf` against the current time, if present.
///
/// # Errors
///
/// See [`check_not_before_at`].
pub fn check_not_before(claims: &Map<String, Value>) -> Result<(), VerifyError> {
    check_not_before_at(claims, unix_now())
}

/// Check `nbf` against `now`, if present.
///
/// # Errors
///
/// - `MalformedToken` - `nbf` is present but not a number
/// - `NotYetValid` - `now < nbf`
pub fn check_not_before_at(claims: &Map<String, Value>, now: i64) -> Result<(), VerifyError> {
    let Some(nbf) = optional_numeric_claim(claims, "nbf")? else {
        return Ok(());
    };

    if now < nbf {
        tracing::debug!(target: "kobble.auth.verifier", nbf = nbf, now = now, "Token rejected: not yet valid");
        return Err(VerifyError::NotYetValid { nbf, now });
    }

    Ok(())
}

/// Check `iat` against the current time, if present.
///
/// # Errors
///
/// See [`check_issued_at_at`].
pub fn check_issued_at(claims: &Map<String, Value>) -> Result<(), VerifyError> {
    check_issued_at_at(claims, unix_now())
}

/// Check `iat` against `now`, if present.
///
/// # Errors
///
/// - `MalformedToken` - `iat` is present but not a number
/// - `IssuedInFuture` - `now < iat`
pub fn check_issued_at_at(claims: &Map<String, Value>, now: i64) -> Result<(), VerifyError> {
    let Some(iat) = optional_numeric_claim(claims, "iat")? else {
        return Ok(());
    };

    if now < iat {
        tracing::debug!(target: "kobble.auth.verifier", iat = iat, now = now, "Token rejected: issued in the future");
        return Err(VerifyError::IssuedInFuture { iat, now });
    }

    Ok(())
}

/// Exact string comparison of `aud`.
///
/// # Errors
///
/// Returns `AudienceMismatch` carrying both values.
pub fn check_audience(claims: &Map<String, Value>, expected: &str) -> Result<(), VerifyError> {
    check_string_claim(claims, "aud", expected).map_err(|actual| {
        tracing::debug!(target: "kobble.auth.verifier", "Token rejected: audience mismatch");
        VerifyError::AudienceMismatch {
            expected: expected.to_string(),
            actual,
        }
    })
}

/// Exact string comparison of `iss`.
///
/// # Errors
///
/// Returns `IssuerMismatch` carrying both values.
pub fn check_issuer(claims: &Map<String, Value>, expected: &str) -> Result<(), VerifyError> {
    check_string_claim(claims, "iss", expected).map_err(|actual| {
        tracing::debug!(target: "kobble.auth.verifier", "Token rejected: issuer mismatch");
        VerifyError::IssuerMismatch {
            expected: expected.to_string(),
            actual,
        }
    })
}

/// `Err(actual)` unless `claims[name]` is the string `expected`.
fn check_string_claim(
    claims: &Map<String, Value>,
    name: &str,
    expected: &str,
) -> Result<(), String> {
    match claims.get(name) {
        Some(Value::String(actual)) if actual == expected => Ok(()),
        Some(Value::String(actual)) => Err(actual.clone()),
        Some(other) => Err(other.to_string()),
        None => Err(Value::Null.to_string()),
    }
}

/// Numeric claim as whole seconds. Fractional values are truncated.
#[allow(clippy::cast_possible_truncation)]
fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn optional_numeric_claim(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Option<i64>, VerifyError> {
    if !claims.contains_key(name) {
        return Ok(None);
    }
    numeric_claim(claims, name)
        .map(Some)
        .ok_or_else(|| VerifyError::MalformedToken(format!("Invalid {name} claim")))
}
