//! Mock HTTP collaborator for resolver and verifier tests.
//!
//! Responses are keyed by the exact path or URL passed to `get_json`.
//! Every call is counted per path, so cache behavior can be asserted
//! without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use kobble_test_utils::MockHttpClient;
//!
//! let http = MockHttpClient::new().with_response("/auth/whoami", whoami_response("p1"));
//! // ... drive a resolver ...
//! assert_eq!(http.call_count("/auth/whoami"), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use kobble_common::http::{HttpError, JsonHttpClient};
use serde_json::{json, Value};

/// Call-counting [`JsonHttpClient`] returning canned responses.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<HashMap<String, Result<Value, HttpError>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl MockHttpClient {
    /// Create a mock with no responses; every path answers 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::set_response`].
    #[must_use]
    pub fn with_response(self, path: &str, body: Value) -> Self {
        self.set_response(path, body);
        self
    }

    /// Builder form of [`Self::set_error`].
    #[must_use]
    pub fn with_error(self, path: &str, error: HttpError) -> Self {
        self.set_error(path, error);
        self
    }

    /// Answer `path` with `body` from now on.
    pub fn set_response(&self, path: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Ok(body));
    }

    /// Answer `path` with `error` from now on.
    pub fn set_error(&self, path: &str, error: HttpError) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), Err(error));
    }

    /// Number of calls made for `path`.
    pub fn call_count(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Number of calls made across all paths.
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl JsonHttpClient for MockHttpClient {
    async fn get_json(&self, path: &str) -> Result<Value, HttpError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert(0) += 1;

        self.responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| {
                Err(HttpError::Status {
                    status: 404,
                    body: format!("no mock response for {path}"),
                })
            })
    }
}

/// Body of `GET /auth/whoami` for `project_id`.
pub fn whoami_response(project_id: &str) -> Value {
    json!({
        "ProjectId": project_id,
        "ProjectSlug": "test-project",
        "UserId": "owner-1",
    })
}

/// Path of the JWKS document for `project_id`, relative to the base URL.
pub fn jwks_path(project_id: &str) -> String {
    format!("/discovery/p/{project_id}/apps/keys")
}
