//! Access and ID token verification against a mocked SDK API.
//!
//! Drives the real `SdkHttpClient` through the `Kobble` facade.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use kobble_auth::{AuthError, Config, ErrorKind, Kobble, VerificationOptions, VerifyError};
use kobble_test_utils::{
    jwks_path, jwks_with_both_keys, jwks_with_primary_key, sign_rs256, whoami_response,
    TestClaimsBuilder, RSA_KID_1, RSA_KID_2, RSA_PRIVATE_KEY_1_PEM, RSA_PRIVATE_KEY_2_PEM,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "sk_test_integration";

async fn mount_whoami(server: &MockServer, project_id: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/whoami"))
        .and(header("Kobble-Sdk-Secret", SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(whoami_response(project_id)))
        .mount(server)
        .await;
}

async fn mount_jwks(server: &MockServer, project_id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(jwks_path(project_id)))
        .and(header("Kobble-Sdk-Secret", SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Server answering whoami with `p1` and publishing key 1.
async fn setup() -> (MockServer, Kobble) {
    let server = MockServer::start().await;
    mount_whoami(&server, "p1").await;
    mount_jwks(&server, "p1", jwks_with_primary_key()).await;

    let kobble = Kobble::new(&Config::new(SECRET).with_base_url(server.uri()));
    (server, kobble)
}

fn sign(builder: TestClaimsBuilder) -> String {
    sign_rs256(&builder.build(), RSA_KID_1, RSA_PRIVATE_KEY_1_PEM)
}

// -----------------------------------------------------------------------------
// Access tokens
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_valid_access_token() -> Result<()> {
    let (_server, kobble) = setup().await;
    let claims = json!({
        "sub": "u1",
        "project_id": "p1",
        "exp": 9_999_999_999_i64,
        "iss": "https://kobble.io",
        "aud": "p1"
    });
    let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);

    let result = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await?;

    assert_eq!(result.user_id, "u1");
    assert_eq!(result.project_id, "p1");
    Ok(())
}

#[tokio::test]
async fn test_expired_access_token() -> Result<()> {
    let (_server, kobble) = setup().await;
    let token = sign(TestClaimsBuilder::access_token("u1", "p1").expires_in(-3600));

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert!(err
        .to_string()
        .starts_with("ACCESS_TOKEN_VERIFICATION_FAILED: "));

    let relaxed = VerificationOptions::default().skip_expiration();
    let result = kobble.verifier().verify_access_token(&token, &relaxed).await?;
    assert_eq!(result.user_id, "u1");
    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_rejected() {
    let (server, kobble) = setup().await;
    let token = sign_rs256(
        &TestClaimsBuilder::access_token("u1", "p1").build(),
        RSA_KID_2,
        RSA_PRIVATE_KEY_2_PEM,
    );

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSigningKey);

    // Publishing the rotated key takes effect on the next refresh
    server.reset().await;
    mount_whoami(&server, "p1").await;
    mount_jwks(&server, "p1", jwks_with_both_keys()).await;

    let jwks_url = format!("{}{}", server.uri(), jwks_path("p1"));
    kobble.verifier().jwks().force_refresh(&jwks_url).await.unwrap();
    assert!(kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_missing_audience_reported() {
    let (_server, kobble) = setup().await;
    let token = sign(TestClaimsBuilder::access_token("u1", "p1").without("aud"));

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.cause(), &VerifyError::MissingClaims(vec!["aud".to_string()]));
}

#[tokio::test]
async fn test_audience_check_toggle() -> Result<()> {
    let (_server, kobble) = setup().await;
    let token = sign(TestClaimsBuilder::access_token("u1", "p1").with("aud", json!("p9")));

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AudienceMismatch);

    let options = VerificationOptions::default().skip_audience();
    kobble.verifier().verify_access_token(&token, &options).await?;
    Ok(())
}

// -----------------------------------------------------------------------------
// Caching
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_keys_and_project_fetched_once() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/whoami"))
        .respond_with(ResponseTemplate::new(200).set_body_json(whoami_response("p1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(jwks_path("p1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_with_primary_key()))
        .expect(1)
        .mount(&server)
        .await;

    let kobble = Kobble::new(&Config::new(SECRET).with_base_url(server.uri()));
    let token = sign(TestClaimsBuilder::access_token("u1", "p1"));

    for _ in 0..5 {
        kobble
            .verifier()
            .verify_access_token(&token, &VerificationOptions::default())
            .await?;
    }

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_keys_refetched_after_ttl() -> Result<()> {
    let server = MockServer::start().await;
    mount_whoami(&server, "p1").await;
    Mock::given(method("GET"))
        .and(path(jwks_path("p1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_with_primary_key()))
        .expect(2)
        .mount(&server)
        .await;

    let config = Config::new(SECRET)
        .with_base_url(server.uri())
        .with_jwks_cache_ttl(Duration::from_millis(100));
    let kobble = Kobble::new(&config);
    let token = sign(TestClaimsBuilder::access_token("u1", "p1"));

    kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await?;

    server.verify().await;
    Ok(())
}

// -----------------------------------------------------------------------------
// Upstream failures
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_jwks_server_error() {
    let server = MockServer::start().await;
    mount_whoami(&server, "p1").await;
    Mock::given(method("GET"))
        .and(path(jwks_path("p1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let kobble = Kobble::new(&Config::new(SECRET).with_base_url(server.uri()));
    let token = sign(TestClaimsBuilder::access_token("u1", "p1"));

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccessTokenVerificationFailed(_)));
    assert_eq!(err.kind(), ErrorKind::UpstreamFetchFailed);
}

#[tokio::test]
async fn test_wrong_secret_fails_project_lookup() {
    let (server, _) = setup().await;
    let kobble = Kobble::new(&Config::new("sk_wrong").with_base_url(server.uri()));
    let token = sign(TestClaimsBuilder::access_token("u1", "p1"));

    let err = kobble
        .verifier()
        .verify_access_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFetchFailed);
}

// -----------------------------------------------------------------------------
// ID tokens
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_id_token_dates_normalized() -> Result<()> {
    let (_server, kobble) = setup().await;
    let token = sign(TestClaimsBuilder::id_token("u1", "p1"));

    let result = kobble
        .verifier()
        .verify_id_token(&token, &VerificationOptions::default())
        .await?;

    assert_eq!(result.user_id, "u1");
    assert_eq!(result.user.updated_at, "2024-03-05T10:15:30Z");
    assert_eq!(result.user.created_at, "2024-01-01T08:00:00Z");
    Ok(())
}

#[tokio::test]
async fn test_id_token_errors_are_named() {
    let (_server, kobble) = setup().await;
    let token = sign(TestClaimsBuilder::id_token("u1", "p1").expires_in(-10));

    let err = kobble
        .verifier()
        .verify_id_token(&token, &VerificationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.name(), "ID_TOKEN_VERIFICATION_FAILED");
    assert_eq!(err.kind(), ErrorKind::Expired);
}

// -----------------------------------------------------------------------------
// Facade
// -----------------------------------------------------------------------------

#[tokio::test]
async fn test_whoami_is_uncached() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/whoami"))
        .and(header("Kobble-Sdk-Secret", SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_json(whoami_response("p1")))
        .expect(2)
        .mount(&server)
        .await;

    let kobble = Kobble::new(&Config::new(SECRET).with_base_url(server.uri()));
    let whoami = kobble.whoami().await?;
    assert_eq!(whoami.project_id, "p1");
    assert_eq!(whoami.project_slug, "test-project");
    kobble.whoami().await?;

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let kobble = Kobble::new(&Config::new(SECRET).with_base_url(server.uri()));
    assert!(kobble.ping().await);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    assert!(!kobble.ping().await);
}
