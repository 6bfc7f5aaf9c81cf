use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::errors::BridgeErrorCode;

/// Infrastructure-level API failures. Domain failures never surface here;
/// they are reported inside a FAILURE bridge envelope instead.
#[derive(Debug, Error, ToSchema)]
pub enum ApiError {
    #[error("Internal server error: {0}")]
    #[allow(dead_code)]
    InternalServerError(String),
    #[error("Database error: {0}")]
    DbError(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DbError(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::DbError(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Outcome of an ingress service call: a stable bridge code for the caller,
/// or a database error for the 500 path.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Bridge(BridgeErrorCode),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<BridgeErrorCode> for ServiceError {
    fn from(code: BridgeErrorCode) -> Self {
        ServiceError::Bridge(code)
    }
}
