pub mod admin;
pub mod ledger;

pub use admin::admin_routes;
pub use ledger::ledger_routes;

use crate::admission::AdmissionController;
use crate::db::{EntryDraft, LedgerRepo};
use crate::error::ApiError;
use crate::report::DATE_FORMAT;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::{Path, Query},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest accepted category, user or entry label.
pub const MAX_NAME_LEN: usize = 100;

/// Shared state for ledger and admin handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<LedgerRepo>,
    pub admission: Arc<AdmissionController>,
}

/// Generic success body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl StatusResponse {
    pub fn ok() -> Json<Self> {
        Json(Self {
            status: "ok",
            id: None,
        })
    }

    pub fn created(id: i64) -> Json<Self> {
        Json(Self {
            status: "ok",
            id: Some(id),
        })
    }
}

/// Body of expense and income create/update requests
#[derive(Debug, Deserialize)]
pub struct EntryPayload {
    pub date: String,
    pub category: String,
    pub amount: f64,
    pub currency: String,
    pub user: String,
}

impl EntryPayload {
    pub fn validate(self) -> Result<EntryDraft, ApiError> {
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .ok()
            .filter(|d| (1..=9999).contains(&d.year()))
            .ok_or_else(|| ApiError::Validation("date must be formatted as YYYY-MM-DD".into()))?;

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ApiError::Validation(
                "amount must be a positive number".into(),
            ));
        }

        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ApiError::Validation(
                "currency must be a three-letter ISO code".into(),
            ));
        }

        Ok(EntryDraft {
            date: date.format(DATE_FORMAT).to_string(),
            category: clean_name("category", &self.category)?,
            amount: self.amount,
            currency: currency.to_ascii_uppercase(),
            user: clean_name("user", &self.user)?,
        })
    }
}

/// Body carrying a single `name`
#[derive(Debug, Deserialize)]
pub struct NamePayload {
    pub name: String,
}

/// Trim a category or user name and check its length.
pub fn clean_name(field: &str, raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

pub(crate) fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}
