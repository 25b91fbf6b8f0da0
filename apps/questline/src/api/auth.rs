//! # Authentication Module
//!
//! API key authentication for the Questline HTTP API.
//!
//! ## Configuration
//!
//! - `QUESTLINE_API_KEY`: If set, all requests (except /health) require this key
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```
//!
//! The key gates the HTTP surface. Which principal may configure or record
//! progress is still decided by the engine's guard.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Rejection body of the middleware.
type Rejection = (StatusCode, &'static str);

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// Returns `Some(key)` if `QUESTLINE_API_KEY` is set and non-empty.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("QUESTLINE_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// The configured key, read once when the router is built.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: String) -> Self {
        Self(Arc::from(key))
    }

    /// Constant-time check of a presented key.
    ///
    /// Both sides are padded to the longer length before comparing.
    fn accepts(&self, provided: &[u8]) -> bool {
        let expected = self.0.as_bytes();
        let width = provided.len().max(expected.len());
        let pad = |bytes: &[u8]| {
            let mut out = vec![0u8; width];
            out[..bytes.len()].copy_from_slice(bytes);
            out
        };
        let same_bytes: bool = pad(provided).ct_eq(&pad(expected)).into();
        same_bytes && provided.len() == expected.len()
    }
}

/// Presented key: `Bearer <key>`, or the raw key.
fn presented_key(request: &Request<Body>) -> Option<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

fn reject(reason: &'static str) -> Rejection {
    tracing::warn!(event = "auth_failure", reason, "Request rejected");
    (StatusCode::UNAUTHORIZED, "Unauthorized")
}

/// API key authentication middleware. `/health` is always allowed.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Rejection> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    match presented_key(&request) {
        None => Err(reject("missing_authorization_header")),
        Some(provided) if key.accepts(provided.as_bytes()) => Ok(next.run(request).await),
        Some(_) => Err(reject("invalid_api_key")),
    }
}
