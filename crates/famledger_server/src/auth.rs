//! Shared-secret authentication for every route except `/health`.

use crate::error::ApiError;
use crate::middleware::ClientAddr;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Header carrying the shared secret.
pub const TOKEN_HEADER: &str = "x-token";

/// Compares presented tokens against the configured secret.
#[derive(Clone)]
pub struct TokenGate {
    secret: Arc<str>,
}

impl TokenGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    pub fn verify(&self, presented: Option<&str>) -> bool {
        presented.is_some_and(|token| token == &*self.secret)
    }
}

/// Middleware rejecting requests without a matching `X-Token` header.
pub async fn require_token(
    State(gate): State<TokenGate>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if !gate.verify(presented) {
        let client = request
            .extensions()
            .get::<ClientAddr>()
            .map(|c| c.0.as_str())
            .unwrap_or("unknown");
        warn!(client = %client, path = %request.uri().path(), "Rejected request with invalid token");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
