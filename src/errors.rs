use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use thiserror::Error;

/// Transport/infrastructure-level failures. Implements `IntoResponse` directly
/// so handlers can propagate it with `?`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound => AppError::NotFound,
            ServiceError::IllegalTransition { .. } => AppError::BadRequest(e.to_string()),
            ServiceError::Database(inner) => AppError::DatabaseError(inner),
            ServiceError::ExternalService(msg) => AppError::Internal(msg),
            ServiceError::Validation(msg) => AppError::BadRequest(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Config(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "internal error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Domain/service-level failures surfaced by the Store, pipeline and worker.
/// A superset of `AppError`'s concerns with status-machine and matching
/// specific variants.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors raised by the distributor client.
#[derive(Error, Debug, Clone)]
pub enum DistributorError {
    #[error("distributor returned an application-level error: {0}")]
    ApiError(String),
    #[error("distributor request failed after retries: {0}")]
    Exhausted(String),
    #[error("distributor returned non-retriable status {0}")]
    NonRetriable(u16),
}

/// Errors raised by the LLM client. Collapsed to a single
/// condition; callers decide whether the failure is terminal or
/// advisory.
#[derive(Error, Debug, Clone)]
#[error("llm request failed: {0}")]
pub struct LlmError(pub String);