//! Raw JWT decoding without trust.
//!
//! This module splits a compact JWT into its three segments and decodes the
//! header and payload JSON. Nothing here verifies a signature or a claim;
//! callers must run claim validation and signature verification before
//! trusting anything decoded here.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any base64 or JSON work (DoS prevention)
//! - The signing input is kept exactly as transmitted, never re-encoded
//! - Decode failures log at debug level only; token contents are never logged
//!
//! # Usage
//!
//! ```rust,ignore
//! use kobble_common::jwt::{decode_header, decode_payload, split_token};
//!
//! let segments = split_token(token)?;
//! let header = decode_header(segments.header)?;
//! let claims = decode_payload(segments.payload)?;
//! let signature = segments.decode_signature()?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any decoding. Access, identity
/// and gateway tokens are all well under 4KB even with a large product list.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// PEM armour label for a `SubjectPublicKeyInfo` document.
pub const PUBLIC_KEY_PEM_LABEL: &str = "PUBLIC KEY";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding a JWT.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("Token size {size} exceeds the maximum of {max} bytes")]
    TokenTooLarge { size: usize, max: usize },

    /// Token structure, base64 or JSON is invalid.
    #[error("{0}")]
    MalformedToken(String),
}

/// Errors that can occur while decoding a PEM public key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PemError {
    /// The armour or base64 body could not be parsed.
    #[error("Failed to decode PEM block containing public key")]
    Malformed,

    /// The armour label is not `PUBLIC KEY`.
    #[error("Unexpected PEM block type: {0}")]
    UnexpectedLabel(String),
}

// =============================================================================
// Types
// =============================================================================

/// The three base64url segments of a compact JWT, borrowed from the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    /// Encoded JOSE header.
    pub header: &'a str,

    /// Encoded claims payload.
    pub payload: &'a str,

    /// Encoded signature.
    pub signature: &'a str,

    signing_input: &'a str,
}

impl<'a> TokenSegments<'a> {
    /// The bytes covered by the signature: `header "." payload` exactly as
    /// they appear in the token.
    #[must_use]
    pub fn signing_input(&self) -> &'a [u8] {
        self.signing_input.as_bytes()
    }

    /// Decode the signature segment from base64url.
    ///
    /// # Errors
    ///
    /// Returns `JwtDecodeError::MalformedToken` if the segment is not valid
    /// base64url.
    pub fn decode_signature(&self) -> Result<Vec<u8>, JwtDecodeError> {
        URL_SAFE_NO_PAD.decode(self.signature).map_err(|e| {
            tracing::debug!(target: "kobble.jwt", error = %e, "Failed to decode JWT signature base64");
            JwtDecodeError::MalformedToken("Failed to decode signature".to_string())
        })
    }
}

/// Decoded JOSE header fields the SDK looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm (`RS256`, `ES256`, ...).
    pub alg: String,

    /// Key ID selecting the verification key, if present.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its header, payload and signature segments.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Token does not have exactly three dot-separated segments
pub fn split_token(token: &str) -> Result<TokenSegments<'_>, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "kobble.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtDecodeError::TokenTooLarge {
            size: token.len(),
            max: MAX_JWT_SIZE_BYTES,
        });
    }

    let parts: Vec<&str> = token.split('.').collect();
    let &[header, payload, signature] = parts.as_slice() else {
        tracing::debug!(
            target: "kobble.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtDecodeError::MalformedToken(format!(
            "Expected three dot separated segments but found {}. Did you pass a valid JWT?",
            parts.len()
        )));
    };

    // header + '.' + payload, borrowed straight from the token
    let signing_input = token
        .get(..header.len() + 1 + payload.len())
        .ok_or_else(|| JwtDecodeError::MalformedToken("Invalid token layout".to_string()))?;

    Ok(TokenSegments {
        header,
        payload,
        signature,
        signing_input,
    })
}

/// Decode a base64url JSON segment into a JSON object.
///
/// # Errors
///
/// Returns `JwtDecodeError::MalformedToken` if the segment is not valid
/// base64url, not valid JSON, or not a JSON object.
pub fn decode_segment(segment: &str) -> Result<Map<String, Value>, JwtDecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "kobble.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtDecodeError::MalformedToken("Failed to decode payload".to_string())
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            tracing::debug!(target: "kobble.jwt", "JWT segment is not a JSON object");
            Err(JwtDecodeError::MalformedToken(
                "Failed to unmarshal payload".to_string(),
            ))
        }
        Err(e) => {
            tracing::debug!(target: "kobble.jwt", error = %e, "Failed to parse JWT segment JSON");
            Err(JwtDecodeError::MalformedToken(
                "Failed to unmarshal payload".to_string(),
            ))
        }
    }
}

/// Decode the claims payload into a claim map.
///
/// # Errors
///
/// See [`decode_segment`].
pub fn decode_payload(segment: &str) -> Result<Map<String, Value>, JwtDecodeError> {
    decode_segment(segment)
}

/// Decode the JOSE header.
///
/// # Errors
///
/// Returns `JwtDecodeError::MalformedToken` if the header cannot be decoded or
/// lacks a string `alg`. A non-string `kid` is treated as malformed too.
pub fn decode_header(segment: &str) -> Result<JwtHeader, JwtDecodeError> {
    let map = decode_segment(segment).map_err(|_| {
        JwtDecodeError::MalformedToken("Failed to decode header".to_string())
    })?;

    serde_json::from_value(Value::Object(map)).map_err(|e| {
        tracing::debug!(target: "kobble.jwt", error = %e, "JWT header has unexpected shape");
        JwtDecodeError::MalformedToken("Invalid JWT header".to_string())
    })
}

/// Decode a base64url value without padding (JWK `n`/`e` fields).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

/// Decode a PEM-armoured `PUBLIC KEY` block into its DER body.
///
/// Only the first block is read; its label must be exactly `PUBLIC KEY`.
///
/// # Errors
///
/// - `Malformed` - No parseable PEM block
/// - `UnexpectedLabel` - The block is not a `PUBLIC KEY`
pub fn decode_public_key_pem(pem: &str) -> Result<Vec<u8>, PemError> {
    let block = pem::parse(pem).map_err(|e| {
        tracing::debug!(target: "kobble.jwt", error = %e, "Failed to parse PEM block");
        PemError::Malformed
    })?;

    if block.tag() != PUBLIC_KEY_PEM_LABEL {
        return Err(PemError::UnexpectedLabel(block.tag().to_string()));
    }

    Ok(block.into_contents())
}

// =============================================================================
// Tests
// =============================================================================
