//! Builder patterns for test token construction
//!
//! Claims are built as JSON so tests can add, remove or corrupt any field,
//! then signed with the fixture keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use serde_json::{json, Map, Value};

use crate::crypto_fixtures::ec_private_scalar;

/// Issuer of access and identity tokens.
pub const TEST_ACCESS_ISSUER: &str = "https://kobble.io";

/// Issuer of gateway tokens.
pub const TEST_GATEWAY_ISSUER: &str = "gateway.kobble.io";

/// Builder for JWT claim sets.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::access_token("u1", "p1")
///     .expires_in(-60)
///     .without("nbf")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestClaimsBuilder {
    claims: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Empty claim set.
    pub fn new() -> Self {
        Self { claims: Map::new() }
    }

    /// Valid access token claims for `sub` in `project_id`.
    pub fn access_token(sub: &str, project_id: &str) -> Self {
        let now = Utc::now().timestamp();
        Self::new()
            .with("sub", json!(sub))
            .with("project_id", json!(project_id))
            .with("exp", json!(now + 3600))
            .with("iat", json!(now))
            .with("nbf", json!(now))
            .with("iss", json!(TEST_ACCESS_ISSUER))
            .with("aud", json!(project_id))
    }

    /// Valid identity token claims for `user_id` in `project_id`.
    ///
    /// Timestamps use the legacy JavaScript `Date.toString()` format.
    pub fn id_token(user_id: &str, project_id: &str) -> Self {
        let now = Utc::now().timestamp();
        Self::new()
            .with("sub", json!(user_id))
            .with("id", json!(user_id))
            .with("email", json!("alice@example.com"))
            .with("name", json!("Alice"))
            .with("picture_url", json!("https://cdn.example.com/alice.png"))
            .with("is_verified", json!(true))
            .with("stripe_id", json!("cus_123"))
            .with(
                "updated_at",
                json!("Tue Mar 05 2024 10:15:30 GMT+0000 (Coordinated Universal Time)"),
            )
            .with(
                "created_at",
                json!("Mon Jan 01 2024 08:00:00 GMT+0000 (Coordinated Universal Time)"),
            )
            .with("exp", json!(now + 3600))
            .with("iat", json!(now))
            .with("nbf", json!(now))
            .with("iss", json!(TEST_ACCESS_ISSUER))
            .with("aud", json!(project_id))
    }

    /// Valid gateway token claims for a user in `project_id`.
    pub fn gateway_token(project_id: &str) -> Self {
        let now = Utc::now().timestamp();
        Self::new()
            .with("project_id", json!(project_id))
            .with("sub", json!("u1"))
            .with("iat", json!(now))
            .with("exp", json!(now + 3600))
            .with("iss", json!(TEST_GATEWAY_ISSUER))
            .with("aud", json!(project_id))
            .with(
                "user",
                json!({
                    "id": "u1",
                    "email": "alice@example.com",
                    "name": "Alice",
                    "products": [{
                        "id": "prod_1",
                        "quotas": [{ "id": "q1", "name": "api-calls", "used": 3, "limit": 100 }]
                    }]
                }),
            )
    }

    /// Set a claim.
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim.
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Set `exp` relative to now. Negative values produce an expired token.
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with("exp", json!(exp))
    }

    /// Set `nbf` relative to now.
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with("nbf", json!(nbf))
    }

    /// Set `iat` relative to now.
    pub fn issued_in(self, seconds: i64) -> Self {
        let iat = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with("iat", json!(iat))
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign `claims` with RS256 and the given PKCS#1 private key.
pub fn sign_rs256(claims: &Value, kid: &str, private_key_pem: &str) -> String {
    sign_rsa(claims, Algorithm::RS256, Some(kid), private_key_pem)
}

/// Sign `claims` with any RSA-family algorithm. `kid` is omitted when `None`.
pub fn sign_rsa(
    claims: &Value,
    algorithm: Algorithm,
    kid: Option<&str>,
    private_key_pem: &str,
) -> String {
    let mut header = Header::new(algorithm);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .expect("fixture RSA key should parse");
    jsonwebtoken::encode(&header, claims, &key).expect("RSA signing should succeed")
}

/// Sign `claims` with ES256 using the fixture P-256 key.
///
/// The signature segment is ASN.1 DER, the encoding gateway tokens use.
pub fn sign_es256_der(claims: &Value) -> String {
    let header = json!({ "alg": "ES256", "typ": "JWT" });
    let signing_input = format!("{}.{}", encode_segment(&header), encode_segment(claims));

    let signing_key =
        SigningKey::from_slice(&ec_private_scalar()).expect("fixture EC scalar should parse");
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let der = signature.to_der();

    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(der.as_bytes()))
}

/// Assemble a token from an arbitrary header and payload with a fixed
/// garbage signature.
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        encode_segment(header),
        encode_segment(claims),
        URL_SAFE_NO_PAD.encode(b"not-a-signature")
    )
}

/// Replace the signature segment of `token` with one taken from `other`.
pub fn with_signature_from(token: &str, other: &str) -> String {
    let (signing_input, _) = token.rsplit_once('.').expect("token has a signature segment");
    let (_, signature) = other.rsplit_once('.').expect("token has a signature segment");
    format!("{signing_input}.{signature}")
}

/// Base64url-encode a JSON value as a JWT segment.
pub fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string().as_bytes())
}
