//! # Authentication Module
//!
//! Bearer API key authentication for the lotgraph HTTP API.
//!
//! The key comes from `[security] api_key` or `LOTGRAPH_API_KEY`. When
//! set, every route except `/health` requires:
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The configured API key, shared by every request.
pub type ApiKey = Arc<str>;

/// Compare two keys in time independent of where they differ.
///
/// Both sides are padded to the same length before `ct_eq`.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed so load balancers can probe it.
pub async fn api_key_auth_middleware(
    State(expected): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = auth_header else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    // Accept both "Bearer <key>" and a raw key.
    let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
    if keys_match(provided, &expected) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_api_key",
            "Authentication failed: invalid API key"
        );
        Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_match() {
        assert!(keys_match("s3cret", "s3cret"));
    }

    #[test]
    fn prefix_does_not_match() {
        assert!(!keys_match("s3c", "s3cret"));
        assert!(!keys_match("s3cret\0", "s3cret"));
        assert!(!keys_match("", "s3cret"));
    }
}
