//! Pre-shared API key authentication.
//!
//! geotrackd has a single operator-configured key ([`ApiKey`], injected as a
//! router extension). Every endpoint except `/api/health` goes through
//! [`require_api_key`], which expects `Authorization: Bearer <key>`.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Extension type carrying the daemon's configured API key.
#[derive(Clone)]
pub struct ApiKey(pub String);

/// Axum middleware gating the authenticated routes.
///
/// - `401 Unauthorized` — no usable `Bearer` token in the request
/// - `403 Forbidden` — token present but it is not the configured key
/// - `500 Internal Server Error` — [`ApiKey`] extension missing (router bug)
pub async fn require_api_key(request: Request, next: Next) -> Response {
    let Some(expected) = request.extensions().get::<ApiKey>().map(|k| k.0.clone()) else {
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "API key not configured");
    };

    match bearer_token(&request) {
        None => reject(StatusCode::UNAUTHORIZED, "Bearer token required"),
        Some(token) if !keys_match(expected.as_bytes(), token.as_bytes()) => {
            reject(StatusCode::FORBIDDEN, "API key rejected")
        }
        Some(_) => next.run(request).await,
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// Pull the token out of a `Authorization: Bearer <token>` header, if any.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Constant-time key comparison.
///
/// Folds over every byte of the configured key whatever the candidate looks
/// like, so rejection latency reveals neither the key length nor the position
/// of the first mismatch.
pub fn keys_match(expected: &[u8], candidate: &[u8]) -> bool {
    let mut diff = expected.len() ^ candidate.len();
    for (i, &byte) in expected.iter().enumerate() {
        diff |= usize::from(byte ^ candidate.get(i).copied().unwrap_or(0x55));
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_keys_match() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secre"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secrets"));
        assert!(!keys_match(b"secret", b""));
        assert!(keys_match(b"", b""));
    }

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/location");
        if let Some(v) = value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_extraction() {
        let req = request_with_auth(Some("Bearer my-key"));
        assert_eq!(bearer_token(&req), Some("my-key"));

        // Wrong scheme, missing header, and bare scheme all come back None
        assert_eq!(bearer_token(&request_with_auth(Some("Basic my-key"))), None);
        assert_eq!(bearer_token(&request_with_auth(Some("Bearer"))), None);
        assert_eq!(bearer_token(&request_with_auth(None)), None);
    }
}
