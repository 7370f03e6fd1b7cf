//! # Kobble Test Utilities
//!
//! Shared test utilities for the Kobble SDK crates.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA and P-256 keys)
//! - Claim builders and token signers (RS256 via `jsonwebtoken`, ES256 via `p256`)
//! - A call-counting mock of the HTTP collaborator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kobble_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let http = MockHttpClient::new()
//!         .with_response("/auth/whoami", whoami_response("p1"))
//!         .with_response(&jwks_path("p1"), jwks_with_primary_key());
//!
//!     let claims = TestClaimsBuilder::access_token("u1", "p1").build();
//!     let token = sign_rs256(&claims, RSA_KID_1, RSA_PRIVATE_KEY_1_PEM);
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_http;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_http::*;
pub use token_builders::*;
