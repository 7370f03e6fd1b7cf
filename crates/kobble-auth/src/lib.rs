//! Kobble server-side SDK: credential verification.
//!
//! Verifies three kinds of bearer credential issued by Kobble:
//!
//! - Access tokens and ID tokens, RSA-signed with a per-project JWKS
//! - Gateway tokens, ES256-signed with a single gateway key
//!
//! Keys and the calling project's id are fetched from the SDK API with the
//! SDK secret and cached in memory:
//!
//! ```text
//! project id (50 min) -> JWKS per URL (15 min)    access / ID tokens
//! gateway key (15 min)                            gateway tokens
//! ```
//!
//! # Modules
//!
//! - `auth` - Claims, resolvers, signature checks and the verifier
//! - `client` - The [`Kobble`] facade
//! - `config` - Configuration from environment
//! - `errors` - Verification error taxonomy

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;

pub use auth::claims::{
    AccessTokenClaims, GatewayTokenClaims, IdTokenUser, IdentityTokenClaims,
    VerifyAccessTokenResult, VerifyIdTokenResult,
};
pub use auth::project::Whoami;
pub use auth::validation::VerificationOptions;
pub use auth::verifier::{TokenKind, TokenVerifier, VerifiedToken};
pub use client::Kobble;
pub use config::{Config, ConfigError};
pub use errors::{AuthError, ErrorKind, VerifyError};
