//! # Error Handling
//!
//! Unified API error type for the control plane plus the central mapper
//! that translates database errors into HTTP statuses: unique violations
//! become 409, foreign-key violations 400, missing rows 404.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr};
use serde::Serialize;
use utoipa::ToSchema;

/// Unified API error response structure.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response.
    #[serde(skip)]
    pub status: StatusCode,
    /// Human-readable error message.
    pub error: String,
    /// Per-field validation messages, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Correlation id propagated from the request, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            error: message.into(),
            details: None,
            trace_id: None,
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self)).into_response()
    }
}

/// 401 with the given message.
pub fn unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, message)
}

/// 404 with the given message.
pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, message)
}

/// 400 carrying a field → message map.
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, message).with_details(field_errors)
}

/// Maps a database error onto an HTTP response, logging the original.
pub fn map_db_err(context: &'static str, err: DbErr) -> ApiError {
    tracing::error!(error = ?err, context, "database operation failed");

    if is_unique_violation(&err) {
        return ApiError::new(StatusCode::CONFLICT, "resource already exists");
    }
    if is_fk_violation(&err) {
        return ApiError::new(StatusCode::BAD_REQUEST, "related record missing");
    }
    if matches!(err, DbErr::RecordNotFound(_)) {
        return ApiError::new(StatusCode::NOT_FOUND, "record not found");
    }
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, context)
}

/// True for Postgres 23505 and the SQLite unique-constraint codes.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(sql_error_code(err).as_deref(), Some("23505") | Some("2067") | Some("1555"))
}

/// True for Postgres 23503 and the SQLite foreign-key code.
pub fn is_fk_violation(err: &DbErr) -> bool {
    matches!(sql_error_code(err).as_deref(), Some("23503") | Some("787"))
}

fn sql_error_code(err: &DbErr) -> Option<String> {
    let sqlx_err = match err {
        DbErr::Exec(RuntimeErr::SqlxError(e)) => e,
        DbErr::Query(RuntimeErr::SqlxError(e)) => e,
        _ => return None,
    };
    match sqlx_err {
        sea_orm::SqlxError::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}
