use crate::admission::Denial;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{}", denial_message(.0))]
    Denied(Denial),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(String),
}

fn denial_message(denial: &Denial) -> &'static str {
    match denial {
        Denial::Blocked => "Access denied",
        Denial::RateLimited => "Too many requests",
        Denial::Suspicious => "Suspicious activity detected",
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Denied(Denial::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Denied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "detail": self.to_string() });
        match &self {
            ApiError::Internal(cause) => error!("Request failed: {}", cause),
            ApiError::Denied(denial) => body["reason"] = json!(denial.as_str()),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
