use axum::{
    extract::rejection::{BytesRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use events_core::{FieldError, StoreError, ValidationError};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    pub error_code: &'static str,
    pub timestamp: String,
}

/// Failures a handler can end with. This is the only place typed failures
/// become HTTP statuses.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    RouteNotFound,
    MethodNotAllowed,
    Timeout,
    /// The cause is logged, never returned to the caller.
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(id),
            StoreError::Conflict(id) => ApiError::Conflict(id),
            StoreError::Database(cause) => ApiError::Internal(cause),
        }
    }
}

/// Extractor rejections keep axum's message but travel in the envelope.
fn rejected(status: StatusCode, detail: String) -> ApiError {
    if status.is_server_error() {
        ApiError::Internal(detail)
    } else {
        ApiError::BadRequest(detail)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        rejected(e.status(), e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        rejected(e.status(), e.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(e: BytesRejection) -> Self {
        rejected(e.status(), e.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(e) if e.has_schema_errors() => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(self) -> ErrorEnvelope {
        let (detail, errors, error_code) = match self {
            ApiError::Validation(ValidationError::EmptyUpdate) => (
                ValidationError::EmptyUpdate.to_string(),
                Vec::new(),
                "VALIDATION_ERROR",
            ),
            ApiError::Validation(ValidationError::Fields(errors)) => {
                ("Validation error".to_string(), errors, "VALIDATION_ERROR")
            }
            ApiError::BadRequest(detail) => (detail, Vec::new(), "BAD_REQUEST"),
            ApiError::NotFound(id) => (
                format!("Event with ID {} not found", id),
                Vec::new(),
                "NOT_FOUND",
            ),
            ApiError::Conflict(id) => (
                format!("Event with ID {} already exists", id),
                Vec::new(),
                "CONFLICT",
            ),
            ApiError::RouteNotFound => ("Not Found".to_string(), Vec::new(), "NOT_FOUND"),
            ApiError::MethodNotAllowed => (
                "Method Not Allowed".to_string(),
                Vec::new(),
                "METHOD_NOT_ALLOWED",
            ),
            ApiError::Timeout => ("Request timed out".to_string(), Vec::new(), "TIMEOUT"),
            ApiError::Internal(_) => (
                "Internal server error".to_string(),
                Vec::new(),
                "INTERNAL_ERROR",
            ),
        };

        ErrorEnvelope {
            detail,
            errors,
            error_code,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(cause) => {
                tracing::error!(error = %cause, "request failed with internal error")
            }
            ApiError::Timeout => tracing::error!("store operation timed out"),
            _ => {}
        }
        (status, Json(self.envelope())).into_response()
    }
}
