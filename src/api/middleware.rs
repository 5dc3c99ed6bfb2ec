//! Request Middleware for the Staking API
//!
//! Provides:
//! - Caller identity extraction from the gateway-set `x-caller-id` header
//! - Request logging
//!
//! Callers are authenticated upstream. This layer only refuses requests that
//! arrive without an identity and hands the identity to handlers as a
//! [`Caller`] extension.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::staking::Identity;

/// Header carrying the authenticated caller identity
pub const CALLER_HEADER: &str = "x-caller-id";

/// Longest identity accepted from the header
const MAX_IDENTITY_LEN: usize = 128;

/// Middleware configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Paths served without a caller identity
    pub public_paths: Vec<String>,
    /// Log every request
    pub log_requests: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_paths: vec!["/health".to_string()],
            log_requests: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityState {
    pub config: IdentityConfig,
}

impl IdentityState {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Identity);

/// Exact match, or a prefix entry ending in `/` that covers a subtree.
fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths
        .iter()
        .any(|p| path == p || (p.ends_with('/') && path.starts_with(p.as_str())))
}

/// Read and sanity-check the caller identity header
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let value = headers.get(CALLER_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_IDENTITY_LEN {
        return None;
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return None;
    }
    Some(Identity::new(value))
}

/// Identity middleware
pub async fn identity_middleware(
    State(state): State<IdentityState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    if is_public_path(&path, &state.config.public_paths) {
        return Ok(next.run(request).await);
    }

    match caller_from_headers(&headers) {
        Some(identity) => {
            debug!(caller = %identity, path = %path, "Caller identified");
            request.extensions_mut().insert(Caller(identity));
            Ok(next.run(request).await)
        }
        None => {
            warn!("Missing or invalid caller identity for path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Request logging middleware
pub async fn logging_middleware(
    State(state): State<IdentityState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_public_paths() {
        let config = IdentityConfig::default();
        assert!(is_public_path("/health", &config.public_paths));
        assert!(!is_public_path("/pool/stake", &config.public_paths));
        assert!(!is_public_path("/healthz-anything", &config.public_paths));
        assert!(!is_public_path("/health/../pool/stake", &config.public_paths));

        let docs = vec!["/docs/".to_string()];
        assert!(is_public_path("/docs/index", &docs));
        assert!(!is_public_path("/docs", &docs));
        assert!(!is_public_path("/docsx", &docs));
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_from_headers(&headers), None);

        headers.insert(CALLER_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(caller_from_headers(&headers), Some(Identity::new("alice")));

        headers.insert(CALLER_HEADER, HeaderValue::from_static("   "));
        assert_eq!(caller_from_headers(&headers), None);

        headers.insert(CALLER_HEADER, HeaderValue::from_static("two words"));
        assert_eq!(caller_from_headers(&headers), None);

        let long = "a".repeat(MAX_IDENTITY_LEN + 1);
        headers.insert(CALLER_HEADER, HeaderValue::from_str(&long).unwrap());
        assert_eq!(caller_from_headers(&headers), None);
    }
}
