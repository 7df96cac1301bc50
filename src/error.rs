//! Error handling module
//!
//! Provides unified error types and handling for the entire application.
//! The governance core and the HTTP layer share `AppError`; only the
//! `IntoResponse` impl knows about status codes.

use crate::governance::PolicyViolation;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Rejected before policy evaluation (illegal jump, missing notes, bad input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A governance policy blocked the action. A violation record exists.
    #[error("Policy '{}' denied the action: {}", .0.policy_name, .0.reason())]
    PolicyDenied(Box<PolicyViolation>),

    /// The entity store could not commit. Nothing was written.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Per-model serialization could not be obtained in time
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may safely retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::ConcurrencyConflict(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<PolicyViolation>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let mut violation = None;

        let (status, error_code, message, details) = match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg,
                None,
            ),
            AppError::PolicyDenied(v) => {
                let message = format!("Policy '{}' blocked this action", v.policy_name);
                let reason = v.reason().to_string();
                violation = Some(*v);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "POLICY_DENIED",
                    message,
                    Some(reason),
                )
            }
            AppError::Storage(msg) => {
                error!("Storage failure: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_FAILURE",
                    "The governance store could not commit the change".to_string(),
                    Some(msg),
                )
            }
            AppError::ConcurrencyConflict(msg) => {
                warn!("Concurrency conflict: {}", msg);
                (
                    StatusCode::CONFLICT,
                    "CONCURRENCY_CONFLICT",
                    msg,
                    None,
                )
            }
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg,
                None,
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                msg,
                None,
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg,
                None,
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                msg,
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
            violation,
            retryable,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers and core operations
pub type ApiResult<T> = Result<T, AppError>;
