//! Token verification.
//!
//! - `claims` - Typed claim sets and verification results
//! - `validation` - Required-claim, time, audience and issuer checks
//! - `jwks` / `gateway_key` / `project` - Cached key and identity resolvers
//! - `signature` - RSA and ES256 signature checks
//! - `verifier` - The verification pipelines

pub mod claims;
pub mod gateway_key;
pub mod jwks;
pub mod project;
pub mod signature;
pub mod validation;
pub mod verifier;
