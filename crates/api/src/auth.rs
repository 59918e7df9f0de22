//! Bearer API key authentication.
//!
//! When a key is configured every route except `/health` requires
//! `Authorization: Bearer <key>`. WebSocket clients send the header on the
//! upgrade request.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Routes reachable without a key.
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Configuration for API key authentication.
#[derive(Clone)]
pub struct ApiKeyConfig {
    key_bytes: Vec<u8>,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig").finish_non_exhaustive()
    }
}

impl ApiKeyConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key_bytes: key.into().into_bytes(),
        }
    }

    /// Constant-time comparison; only the length check short-circuits.
    pub fn verify(&self, provided: &[u8]) -> bool {
        if self.key_bytes.len() != provided.len() {
            return false;
        }
        let diff = self
            .key_bytes
            .iter()
            .zip(provided)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Reject requests without a valid bearer key. A no-op when no key is set.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(config) = &state.api_key else {
        return next.run(request).await;
    };

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    match extract_bearer_token(request.headers()) {
        Some(token) if config.verify(token.as_bytes()) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Invalid API key");
            ApiError::new(StatusCode::UNAUTHORIZED, "INVALID_API_KEY", "Invalid API key")
                .into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Missing Authorization header");
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "MISSING_API_KEY",
                "Missing or invalid Authorization header. Use: Authorization: Bearer <key>",
            )
            .into_response()
        }
    }
}
