//! Secret types for the SDK secret and other sensitive values.
//!
//! Re-exports [`secrecy`] so downstream crates do not need a direct
//! dependency. `SecretString` redacts itself in `Debug`, so the SDK secret
//! can sit inside `Config` and `SdkHttpClient` without leaking into logs.
//!
//! ```rust
//! use kobble_common::secret::{ExposeSecret, SecretString};
//!
//! let secret = SecretString::from("sk_live_123");
//! assert!(!format!("{secret:?}").contains("sk_live_123"));
//!
//! // Only the HTTP layer calls expose_secret(), to fill the header
//! assert_eq!(secret.expose_secret(), "sk_live_123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("sk_test_abc");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("sk_test_abc"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("sk_test_abc");
        assert_eq!(secret.expose_secret(), "sk_test_abc");
    }

    #[test]
    fn test_deserialize_from_json() {
        #[derive(Debug, serde::Deserialize)]
        struct Settings {
            sdk_secret: SecretString,
        }

        let settings: Settings =
            serde_json::from_str(r#"{"sdk_secret": "sk_from_file"}"#).expect("deserialize");
        assert_eq!(settings.sdk_secret.expose_secret(), "sk_from_file");
        assert!(!format!("{settings:?}").contains("sk_from_file"));
    }
}
