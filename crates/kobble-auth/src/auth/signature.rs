//! Signature verification.
//!
//! Two paths:
//!
//! - RSA (JWKS): the header `alg` must be RSA-family and the header `kid`
//!   must name a key in the resolved [`KeySet`]. No other key is tried.
//! - ES256 (gateway): P-256 with SHA-256 against the single gateway key.
//!   The signature segment is ASN.1 DER and is verified as transmitted.
//!
//! Both verify over the `header.payload` bytes exactly as they appear in the
//! token.

use crate::auth::gateway_key::GatewayKey;
use crate::auth::jwks::KeySet;
use crate::errors::VerifyError;
use kobble_common::jwt::{JwtHeader, TokenSegments};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::Signature;
use ring::signature::{self as ring_sig, RsaParameters, RsaPublicKeyComponents};

/// The only algorithm accepted on the gateway path.
pub const GATEWAY_ALGORITHM: &str = "ES256";

fn unexpected_method(alg: &str) -> VerifyError {
    VerifyError::UnknownSigningKey(format!("unexpected signing method: {alg}"))
}

/// Verification parameters for an RSA-family `alg`.
///
/// # Errors
///
/// Returns `UnknownSigningKey` for any non-RSA algorithm, `none` included.
pub fn rsa_parameters(alg: &str) -> Result<&'static RsaParameters, VerifyError> {
    match alg {
        "RS256" => Ok(&ring_sig::RSA_PKCS1_2048_8192_SHA256),
        "RS384" => Ok(&ring_sig::RSA_PKCS1_2048_8192_SHA384),
        "RS512" => Ok(&ring_sig::RSA_PKCS1_2048_8192_SHA512),
        "PS256" => Ok(&ring_sig::RSA_PSS_2048_8192_SHA256),
        "PS384" => Ok(&ring_sig::RSA_PSS_2048_8192_SHA384),
        "PS512" => Ok(&ring_sig::RSA_PSS_2048_8192_SHA512),
        other => Err(unexpected_method(other)),
    }
}

/// Check the header names the gateway algorithm.
///
/// # Errors
///
/// Returns `UnknownSigningKey` for anything but `ES256`.
pub fn ensure_gateway_algorithm(alg: &str) -> Result<(), VerifyError> {
    if alg == GATEWAY_ALGORITHM {
        Ok(())
    } else {
        Err(unexpected_method(alg))
    }
}

/// Verify an RSA-signed token against the key its `kid` names.
///
/// # Errors
///
/// - `UnknownSigningKey` - Non-RSA `alg`, missing `kid`, or `kid` not in `keys`
/// - `MalformedToken` - Signature segment is not base64url
/// - `InvalidSignature` - Signature does not verify
pub fn verify_rsa(
    segments: &TokenSegments<'_>,
    header: &JwtHeader,
    keys: &KeySet,
) -> Result<(), VerifyError> {
    let params = rsa_parameters(&header.alg)?;

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| VerifyError::UnknownSigningKey("kid header not found".to_string()))?;

    let key = keys.get(kid).ok_or_else(|| {
        tracing::debug!(target: "kobble.auth.signature", kid = %kid, "Key not found in JWKS");
        VerifyError::UnknownSigningKey("unable to find appropriate key".to_string())
    })?;

    let signature = segments.decode_signature()?;

    RsaPublicKeyComponents {
        n: key.modulus(),
        e: key.exponent(),
    }
    .verify(params, segments.signing_input(), &signature)
    .map_err(|_| {
        tracing::debug!(target: "kobble.auth.signature", kid = %kid, alg = %header.alg, "RSA signature verification failed");
        VerifyError::InvalidSignature
    })
}

/// Verify an ES256 token against the gateway key.
///
/// # Errors
///
/// - `UnknownSigningKey` - `alg` is not `ES256`
/// - `MalformedToken` - Signature segment is not base64url
/// - `InvalidSignature` - Signature is not valid DER or does not verify
pub fn verify_es256(
    segments: &TokenSegments<'_>,
    header: &JwtHeader,
    key: &GatewayKey,
) -> Result<(), VerifyError> {
    ensure_gateway_algorithm(&header.alg)?;

    let signature_bytes = segments.decode_signature()?;

    let signature = Signature::from_der(&signature_bytes).map_err(|_| {
        tracing::debug!(target: "kobble.auth.signature", "Gateway signature is not valid DER");
        VerifyError::InvalidSignature
    })?;

    key.verifying_key()
        .verify(segments.signing_input(), &signature)
        .map_err(|_| {
            tracing::debug!(target: "kobble.auth.signature", "ES256 signature verification failed");
            VerifyError::InvalidSignature
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::JwksResponse;
    use jsonwebtoken::Algorithm;
    use kobble_common::jwt::{decode_header, split_token};
    use kobble_test_utils::{
        jwks_with_both_keys, jwks_with_primary_key, sign_es256_der, sign_rs256, sign_rsa,
        unsigned_token, with_signature_from, TestClaimsBuilder, EC_PUBLIC_KEY_PEM, RSA_KID_1,
        RSA_KID_2, RSA_PRIVATE_KEY_1_PEM, RSA_PRIVATE_KEY_2_PEM,
    };
    use serde_json::json;

    fn key_set(jwks: serde_json::Value) -> KeySet {
        let response: JwksResponse = serde_json::from_value(jwks).unwrap();
        KeySet::from_jwks(&response)
    }

    fn verify_rsa_token(token: &str, keys: &KeySet) -> Result<(), VerifyError> {
        let segments = split_token(token).unwrap();
        let header = decode_header(segments.header).unwrap();
        verify_rsa(&segments, &header, keys)
    }

    fn verify_gateway_token(token: &str) -> Result<(), VerifyError> {
        let key = GatewayKey::from_pem(EC_PUBLIC_KEY_PEM, "p1").unwrap();
        let segments = split_token(token).unwrap();
        let header = decode_header(segments.header).unwrap();
        verify_es256(&segments, &header, &key)
    }

    // -------------------------------------------------------------------------
    // RSA
    // -------------------------------------------------------------------------

    #[test]
    fn test_rs256_valid() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);
        assert!(verify_rsa_token(&token, &key_set(jwks_with_primary_key())).is_ok());
    }

    #[test]
    fn test_rsa_family_algorithms() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let keys = key_set(jwks_with_primary_key());
        for alg in [
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ] {
            let token = sign_rsa(&claims, alg, Some(RSA_KID_1), RSA_PRIVATE_KEY_1_PEM);
            assert!(verify_rsa_token(&token, &keys).is_ok(), "{alg:?} should verify");
        }
    }

    #[test]
    fn test_unknown_kid_has_no_fallback() {
        // Signed by key 2 but naming a kid that is not published. Key 2 itself
        // is in the set and would verify.
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rs256(&claims, "rotated-away", RSA_PRIVATE_KEY_2_PEM);

        let err = verify_rsa_token(&token, &key_set(jwks_with_both_keys())).unwrap_err();
        assert_eq!(
            err,
            VerifyError::UnknownSigningKey("unable to find appropriate key".to_string())
        );
    }

    #[test]
    fn test_kid_selects_key_exactly() {
        // Signed by key 2 but claiming key 1
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_2_PEM);

        let err = verify_rsa_token(&token, &key_set(jwks_with_both_keys())).unwrap_err();
        assert_eq!(err, VerifyError::InvalidSignature);

        let token = sign_rs256(&claims, RSA_KID_2, RSA_PRIVATE_KEY_2_PEM);
        assert!(verify_rsa_token(&token, &key_set(jwks_with_both_keys())).is_ok());
    }

    #[test]
    fn test_missing_kid() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rsa(&claims, Algorithm::RS256, None, RSA_PRIVATE_KEY_1_PEM);
        let err = verify_rsa_token(&token, &key_set(jwks_with_primary_key())).unwrap_err();
        assert_eq!(
            err,
            VerifyError::UnknownSigningKey("kid header not found".to_string())
        );
    }

    #[test]
    fn test_non_rsa_algorithms_rejected() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let keys = key_set(jwks_with_primary_key());
        for alg in ["none", "HS256", "ES256", "EdDSA"] {
            let token = unsigned_token(&json!({"alg": alg, "kid": RSA_KID_1}), &claims);
            assert_eq!(
                verify_rsa_token(&token, &keys).unwrap_err(),
                VerifyError::UnknownSigningKey(format!("unexpected signing method: {alg}"))
            );
        }
    }

    #[test]
    fn test_tampered_payload_fails() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);

        let forged_claims = TestClaimsBuilder::access_token("admin", "p1").build();
        let forged = sign_rs256(&forged_claims, RSA_KID_1, RSA_PRIVATE_KEY_2_PEM);
        let spliced = with_signature_from(&forged, &token);

        assert_eq!(
            verify_rsa_token(&spliced, &key_set(jwks_with_primary_key())).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_signature_not_base64() {
        let claims = TestClaimsBuilder::access_token("u1", "p1").build();
        let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);
        let (input, _) = token.rsplit_once('.').unwrap();
        let broken = format!("{input}.***");

        assert!(matches!(
            verify_rsa_token(&broken, &key_set(jwks_with_primary_key())),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    // -------------------------------------------------------------------------
    // ES256
    // -------------------------------------------------------------------------

    #[test]
    fn test_es256_der_valid() {
        let token = sign_es256_der(&TestClaimsBuilder::gateway_token("p1").build());
        assert!(verify_gateway_token(&token).is_ok());
    }

    #[test]
    fn test_es256_tampered_payload_fails() {
        let original = sign_es256_der(&TestClaimsBuilder::gateway_token("p1").build());
        let other = sign_es256_der(&TestClaimsBuilder::gateway_token("p2").build());
        let spliced = with_signature_from(&other, &original);

        assert_eq!(
            verify_gateway_token(&spliced).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_es256_non_der_signature_is_invalid() {
        let claims = TestClaimsBuilder::gateway_token("p1").build();
        let token = unsigned_token(&json!({"alg": "ES256"}), &claims);
        assert_eq!(
            verify_gateway_token(&token).unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_gateway_rejects_other_algorithms() {
        let claims = TestClaimsBuilder::gateway_token("p1").build();
        let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);
        assert_eq!(
            verify_gateway_token(&token).unwrap_err(),
            VerifyError::UnknownSigningKey("unexpected signing method: RS256".to_string())
        );
    }
}
