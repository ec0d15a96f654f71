use crate::auth::{TokenGate, require_token};
use crate::error::ApiError;
use crate::handlers::{AppState, admin_routes, ledger_routes};
use crate::middleware::{AdmissionState, admit};
use axum::{Json, Router, middleware::from_fn_with_state, response::IntoResponse, routing::get};

/// Assemble the full application router.
///
/// Layer order for everything except `/health`: admission, then the token
/// check, then the handler (or a 404 fallback).
pub fn app_router(state: AppState, gate: TokenGate, trust_forwarded_for: bool) -> Router {
    let admission = AdmissionState {
        controller: state.admission.clone(),
        trust_forwarded_for,
    };

    let guarded = Router::new()
        .merge(ledger_routes(state.clone()))
        .nest("/admin", admin_routes(state))
        .fallback(not_found)
        .layer(from_fn_with_state(gate, require_token))
        .layer(from_fn_with_state(admission, admit));

    Router::new().route("/health", get(health)).merge(guarded)
}

/// GET /health - Liveness probe, no auth and no admission
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}
