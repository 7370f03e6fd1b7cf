//! Kobble auth error types.
//!
//! Two layers:
//!
//! - [`VerifyError`] is produced by each individual step (decode, claim check,
//!   key resolution, signature) and maps to a stable [`ErrorKind`] callers
//!   can branch on.
//! - [`AuthError`] is what the public verification entry points return. It
//!   names the flow that failed and keeps the first `VerifyError` as its
//!   source.

use kobble_common::http::HttpError;
use kobble_common::jwt::{JwtDecodeError, PemError};
use thiserror::Error;

/// Stable classification of a verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedToken,
    MissingClaims,
    Expired,
    NotYetValid,
    IssuedInFuture,
    AudienceMismatch,
    IssuerMismatch,
    UnknownSigningKey,
    InvalidSignature,
    UpstreamFetchFailed,
}

/// A single verification step failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{0}")]
    MalformedToken(String),

    #[error("The following required claims are missing from the token payload: [{}]", .0.join(" "))]
    MissingClaims(Vec<String>),

    #[error("This token expired on {} which is BEFORE the current datetime {}", format_unix(*.exp), format_unix(*.now))]
    Expired { exp: i64, now: i64 },

    #[error("This token is not valid before {} which is AFTER the current datetime {}", format_unix(*.nbf), format_unix(*.now))]
    NotYetValid { nbf: i64, now: i64 },

    #[error("This token was issued on {} which is AFTER the current datetime {}", format_unix(*.iat), format_unix(*.now))]
    IssuedInFuture { iat: i64, now: i64 },

    #[error("Invalid audience: expected {expected} but got {actual}")]
    AudienceMismatch { expected: String, actual: String },

    #[error("Invalid issuer: expected {expected} but got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("{0}")]
    UnknownSigningKey(String),

    /// The resolved key is not of the type the flow requires.
    #[error("Unexpected public key type: expected {expected} but got {actual}")]
    KeyTypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Failed to fetch {context}: {source}")]
    UpstreamFetchFailed {
        context: &'static str,
        #[source]
        source: HttpError,
    },
}

impl VerifyError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::MalformedToken(_) => ErrorKind::MalformedToken,
            VerifyError::MissingClaims(_) => ErrorKind::MissingClaims,
            VerifyError::Expired { .. } => ErrorKind::Expired,
            VerifyError::NotYetValid { .. } => ErrorKind::NotYetValid,
            VerifyError::IssuedInFuture { .. } => ErrorKind::IssuedInFuture,
            VerifyError::AudienceMismatch { .. } => ErrorKind::AudienceMismatch,
            VerifyError::IssuerMismatch { .. } => ErrorKind::IssuerMismatch,
            VerifyError::UnknownSigningKey(_) | VerifyError::KeyTypeMismatch { .. } => {
                ErrorKind::UnknownSigningKey
            }
            VerifyError::InvalidSignature => ErrorKind::InvalidSignature,
            VerifyError::UpstreamFetchFailed { .. } => ErrorKind::UpstreamFetchFailed,
        }
    }
}

impl From<JwtDecodeError> for VerifyError {
    fn from(err: JwtDecodeError) -> Self {
        VerifyError::MalformedToken(err.to_string())
    }
}

impl From<PemError> for VerifyError {
    fn from(err: PemError) -> Self {
        VerifyError::UnknownSigningKey(err.to_string())
    }
}

/// Render a Unix timestamp for error messages, falling back to the raw
/// number when it is out of range.
fn format_unix(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339())
}

/// Error returned by the public verification flows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("ACCESS_TOKEN_VERIFICATION_FAILED: Access token verification failed. Are you passing the correct access token?")]
    AccessTokenVerificationFailed(#[source] VerifyError),

    #[error("ID_TOKEN_VERIFICATION_FAILED: ID token verification failed. Are you passing the correct ID token?")]
    IdTokenVerificationFailed(#[source] VerifyError),

    #[error("GATEWAY_TOKEN_VERIFICATION_FAILED: Gateway token verification failed. Are you passing the correct gateway token?")]
    GatewayTokenVerificationFailed(#[source] VerifyError),
}

impl AuthError {
    /// Uppercase error code, stable across releases.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AuthError::AccessTokenVerificationFailed(_) => "ACCESS_TOKEN_VERIFICATION_FAILED",
            AuthError::IdTokenVerificationFailed(_) => "ID_TOKEN_VERIFICATION_FAILED",
            AuthError::GatewayTokenVerificationFailed(_) => "GATEWAY_TOKEN_VERIFICATION_FAILED",
        }
    }

    /// The step failure that aborted the flow.
    #[must_use]
    pub fn cause(&self) -> &VerifyError {
        match self {
            AuthError::AccessTokenVerificationFailed(cause)
            | AuthError::IdTokenVerificationFailed(cause)
            | AuthError::GatewayTokenVerificationFailed(cause) => cause,
        }
    }

    /// Shorthand for `self.cause().kind()`.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.cause().kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_claims_lists_every_name() {
        let err = VerifyError::MissingClaims(vec!["aud".to_string(), "iss".to_string()]);
        assert_eq!(
            err.to_string(),
            "The following required claims are missing from the token payload: [aud iss]"
        );
        assert_eq!(err.kind(), ErrorKind::MissingClaims);
    }

    #[test]
    fn test_mismatch_messages_carry_both_values() {
        let err = VerifyError::AudienceMismatch {
            expected: "p1".to_string(),
            actual: "p2".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid audience: expected p1 but got p2");

        let err = VerifyError::IssuerMismatch {
            expected: "https://kobble.io".to_string(),
            actual: "null".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid issuer: expected https://kobble.io but got null"
        );
    }

    #[test]
    fn test_expired_message_renders_dates() {
        let err = VerifyError::Expired { exp: 0, now: 60 };
        let msg = err.to_string();
        assert!(msg.contains("1970-01-01T00:00:00+00:00"));
        assert!(msg.contains("BEFORE"));
    }

    #[test]
    fn test_key_type_mismatch_is_unknown_signing_key_kind() {
        let err = VerifyError::KeyTypeMismatch {
            expected: "ECDSA P-256",
            actual: "RSA".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnknownSigningKey);
    }

    #[test]
    fn test_upstream_error_keeps_source() {
        let err = VerifyError::UpstreamFetchFailed {
            context: "JWKS",
            source: HttpError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::UpstreamFetchFailed);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_auth_error_display_and_name() {
        let err = AuthError::AccessTokenVerificationFailed(VerifyError::InvalidSignature);
        assert_eq!(err.name(), "ACCESS_TOKEN_VERIFICATION_FAILED");
        assert!(err
            .to_string()
            .starts_with("ACCESS_TOKEN_VERIFICATION_FAILED: Access token verification failed."));
        assert_eq!(err.kind(), ErrorKind::InvalidSignature);
        assert_eq!(
            err.source().unwrap().to_string(),
            VerifyError::InvalidSignature.to_string()
        );
    }

    #[test]
    fn test_decode_errors_convert_to_malformed() {
        let err: VerifyError = JwtDecodeError::MalformedToken("bad".to_string()).into();
        assert_eq!(err, VerifyError::MalformedToken("bad".to_string()));
    }
}
