//! Common utilities shared across the Kobble SDK crates.

#![warn(clippy::pedantic)]

/// Module for the generic TTL cache backing every resolver
pub mod cache;

/// Module for the injected HTTP collaborator (GET JSON)
pub mod http;

/// Module for raw JWT decoding (segments, header, payload, PEM)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
