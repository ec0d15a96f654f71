use super::{
    AppState, EntryPayload, NamePayload, StatusResponse, clean_name, json_body, path_param,
    query_params,
};
use crate::db::{CategoryInfo, EntryKind, LedgerEntry};
use crate::error::ApiError;
use crate::report::{MonthRange, MonthlyReport};
use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query, State},
    routing::{delete, get, put},
};
use serde::Deserialize;
use tracing::{debug, info};

/// Create the household-facing routes
pub fn ledger_routes(state: AppState) -> Router {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/{id}",
            put(update_expense).delete(delete_expense),
        )
        .route("/incomes", get(list_incomes).post(create_income))
        .route("/incomes/{id}", put(update_income).delete(delete_income))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", delete(delete_category))
        .route("/users", get(list_users))
        .route("/reports/monthly", get(monthly_report))
        .with_state(state)
}

// ===== Shared entry operations =====

fn create_entry(
    state: &AppState,
    kind: EntryKind,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let draft = json_body(body)?.validate()?;
    let id = state.repo.insert_entry(kind, &draft)?;
    debug!("{} {} recorded for {}", kind.label(), id, draft.user);
    Ok(StatusResponse::created(id))
}

pub(super) fn update_entry(
    state: &AppState,
    kind: EntryKind,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = path_param(id)?;
    let draft = json_body(body)?.validate()?;
    if !state.repo.update_entry(kind, id, &draft)? {
        return Err(ApiError::NotFound(format!("{} not found", kind.label())));
    }
    info!("{} {} updated", kind.label(), id);
    Ok(StatusResponse::ok())
}

pub(super) fn delete_entry(
    state: &AppState,
    kind: EntryKind,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = path_param(id)?;
    if !state.repo.delete_entry(kind, id)? {
        return Err(ApiError::NotFound(format!("{} not found", kind.label())));
    }
    info!("{} {} deleted", kind.label(), id);
    Ok(StatusResponse::ok())
}

// ===== Expenses =====

/// GET /expenses - All expenses, newest first
async fn list_expenses(State(state): State<AppState>) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(state.repo.list_entries(EntryKind::Expense)?))
}

/// POST /expenses
async fn create_expense(
    State(state): State<AppState>,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    create_entry(&state, EntryKind::Expense, body)
}

/// PUT /expenses/:id
pub(super) async fn update_expense(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    update_entry(&state, EntryKind::Expense, id, body)
}

/// DELETE /expenses/:id
pub(super) async fn delete_expense(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    delete_entry(&state, EntryKind::Expense, id)
}

// ===== Incomes =====

/// GET /incomes - All incomes, newest first
async fn list_incomes(State(state): State<AppState>) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    Ok(Json(state.repo.list_entries(EntryKind::Income)?))
}

/// POST /incomes
async fn create_income(
    State(state): State<AppState>,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    create_entry(&state, EntryKind::Income, body)
}

/// PUT /incomes/:id
pub(super) async fn update_income(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<EntryPayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    update_entry(&state, EntryKind::Income, id, body)
}

/// DELETE /incomes/:id
pub(super) async fn delete_income(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    delete_entry(&state, EntryKind::Income, id)
}

// ===== Categories and users =====

/// GET /categories
async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryInfo>>, ApiError> {
    Ok(Json(state.repo.list_categories()?))
}

/// POST /categories - 409 if the name exists
async fn create_category(
    State(state): State<AppState>,
    body: Result<Json<NamePayload>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let name = clean_name("name", &json_body(body)?.name)?;
    match state.repo.create_category(&name)? {
        Some(id) => {
            info!("Category {:?} created", name);
            Ok(StatusResponse::created(id))
        }
        None => Err(ApiError::Conflict("Category already exists".into())),
    }
}

/// DELETE /categories/:id
async fn delete_category(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = path_param(id)?;
    if !state.repo.delete_category(id)? {
        return Err(ApiError::NotFound("Category not found".into()));
    }
    info!("Category {} deleted", id);
    Ok(StatusResponse::ok())
}

/// GET /users - Plain list of user names
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.repo.list_users()?))
}

// ===== Reports =====

#[derive(Debug, Deserialize)]
struct ReportQuery {
    year: i32,
    month: u32,
}

/// GET /reports/monthly?year=&month=
async fn monthly_report(
    State(state): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<MonthlyReport>, ApiError> {
    let query = query_params(query)?;
    let range = MonthRange::new(query.year, query.month)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(Json(state.repo.monthly_report(&range)?))
}
