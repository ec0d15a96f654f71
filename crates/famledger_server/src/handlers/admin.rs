use super::ledger::{delete_expense, delete_income, update_expense, update_income};
use super::{AppState, NamePayload, StatusResponse, clean_name, json_body, path_param};
use crate::admission::SecurityStats;
use crate::db::{LedgerStats, UserRemoval, UserRename};
use crate::error::ApiError;
use crate::middleware::ClientAddr;
use axum::{
    Extension, Json, Router,
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Admission policy as reported by the security view
#[derive(Debug, Serialize)]
pub struct PolicyView {
    pub max_requests: usize,
    pub window_secs: u64,
    pub max_tracked_clients: usize,
    pub suspicious_patterns: Vec<String>,
}

/// Response of GET /admin/security
#[derive(Debug, Serialize)]
pub struct SecurityResponse {
    #[serde(flatten)]
    pub stats: SecurityStats,
    pub policy: PolicyView,
}

#[derive(Debug, Deserialize)]
struct UnblockRequest {
    ip: String,
}

#[derive(Debug, Serialize)]
struct UnblockResponse {
    status: &'static str,
    ip: String,
    was_blocked: bool,
}

#[derive(Debug, Serialize)]
struct RenameUserResponse {
    status: &'static str,
    expenses_updated: usize,
    incomes_updated: usize,
}

/// Create admin routes (nested under /admin)
pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/reset", post(reset_database))
        .route(
            "/expenses/{id}",
            put(update_expense).delete(delete_expense),
        )
        .route("/incomes/{id}", put(update_income).delete(delete_income))
        .route("/users", post(create_user))
        .route("/users/{name}", put(rename_user).delete(delete_user))
        .route("/stats", get(ledger_stats))
        .route("/security", get(security_view))
        .route("/unblock-ip", post(unblock_ip))
        .route("/reset-security", post(reset_security))
        .with_state(state)
}

/// User names end up in `/admin/users/{name}` paths, so a name the path
/// filter would match is refused up front.
fn user_name(state: &AppState, raw: &str) -> Result<String, ApiError> {
    let name = clean_name("name", raw)?;
    if let Some(pattern) = state.admission.suspicious_pattern(&name) {
        return Err(ApiError::Validation(format!(
            "name must not contain {pattern:?}"
        )));
    }
    Ok(name)
}

fn client_of(addr: &Option<Extension<ClientAddr>>) -> &str {
    addr.as_ref().map(|Extension(c)| c.0.as_str()).unwrap_or("unknown")
}

/// POST /admin/reset - Wipe all data and reseed defaults
async fn reset_database(
    State(state): State<AppState>,
    client: Option<Extension<ClientAddr>>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.repo.reset_data()?;
    warn!(client = %client_of(&client), "Database reset to defaults");
    Ok(StatusResponse::ok())
}

/// POST /admin/users - 409 if the name exists
async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<NamePayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let name = user_name(&state, &json_body(body)?.name)?;
    match state.repo.create_user(&name)? {
        Some(id) => {
            info!("User {:?} created", name);
            Ok(StatusResponse::created(id))
        }
        None => Err(ApiError::Conflict("User already exists".into())),
    }
}

/// PUT /admin/users/:old_name - Rename and rewrite existing entries
async fn rename_user(
    State(state): State<AppState>,
    old_name: Result<Path<String>, PathRejection>,
    body: Result<Json<NamePayload>, JsonRejection>,
) -> Result<Json<RenameUserResponse>, ApiError> {
    let old_name = path_param(old_name)?;
    let new_name = user_name(&state, &json_body(body)?.name)?;

    match state.repo.rename_user(&old_name, &new_name)? {
        UserRename::Renamed { expenses, incomes } => {
            info!(
                "User {:?} renamed to {:?} ({} expenses, {} incomes updated)",
                old_name, new_name, expenses, incomes
            );
            Ok(Json(RenameUserResponse {
                status: "ok",
                expenses_updated: expenses,
                incomes_updated: incomes,
            }))
        }
        UserRename::NotFound => Err(ApiError::NotFound("User not found".into())),
        UserRename::NameTaken => Err(ApiError::Conflict("User already exists".into())),
    }
}

/// DELETE /admin/users/:name - Refused while expenses reference the user
async fn delete_user(
    State(state): State<AppState>,
    name: Result<Path<String>, PathRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let name = path_param(name)?;
    match state.repo.delete_user(&name)? {
        UserRemoval::Removed => {
            info!("User {:?} deleted", name);
            Ok(StatusResponse::ok())
        }
        UserRemoval::NotFound => Err(ApiError::NotFound("User not found".into())),
        UserRemoval::InUse(count) => Err(ApiError::Conflict(format!(
            "User is in use by {count} expense(s)"
        ))),
    }
}

/// GET /admin/stats - Dashboard counts and totals
async fn ledger_stats(State(state): State<AppState>) -> Result<Json<LedgerStats>, ApiError> {
    Ok(Json(state.repo.ledger_stats()?))
}

/// GET /admin/security - Admission state and active policy
async fn security_view(State(state): State<AppState>) -> Json<SecurityResponse> {
    let policy = state.admission.policy();
    Json(SecurityResponse {
        stats: state.admission.stats(),
        policy: PolicyView {
            max_requests: policy.max_requests,
            window_secs: policy.window.as_secs(),
            max_tracked_clients: policy.max_tracked_clients,
            suspicious_patterns: policy.suspicious_patterns.clone(),
        },
    })
}

/// POST /admin/unblock-ip - Lift a block and clear the client's history
async fn unblock_ip(
    State(state): State<AppState>,
    client: Option<Extension<ClientAddr>>,
    body: Result<Json<UnblockRequest>, JsonRejection>,
) -> Result<Json<UnblockResponse>, ApiError> {
    let ip = json_body(body)?.ip.trim().to_string();
    if ip.is_empty() {
        return Err(ApiError::Validation("ip must not be empty".into()));
    }

    let was_blocked = state.admission.unblock(&ip);
    warn!(client = %client_of(&client), target_ip = %ip, was_blocked, "Admin unblocked address");
    Ok(Json(UnblockResponse {
        status: "ok",
        ip,
        was_blocked,
    }))
}

/// POST /admin/reset-security - Clear every block and client record
async fn reset_security(
    State(state): State<AppState>,
    client: Option<Extension<ClientAddr>>,
) -> Json<StatusResponse> {
    state.admission.reset_security();
    warn!(client = %client_of(&client), "Admin reset security state");
    StatusResponse::ok()
}
