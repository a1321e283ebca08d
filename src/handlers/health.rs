//! Liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;

use crate::db;
use crate::error::ApiError;
use crate::server::AppState;

/// Liveness: always 200 "ok".
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is alive")),
    tag = "health"
)]
pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness: pings the database and confirms no pending migrations.
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Ready to serve"),
        (status = 503, description = "Database unreachable or migrations pending", body = ApiError)
    ),
    tag = "health"
)]
pub async fn readyz(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    match db::ready(&state.db).await {
        Ok(()) => Ok("ok"),
        Err(err) => Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            .with_details(serde_json::json!({ "error": err.to_string() }))),
    }
}
