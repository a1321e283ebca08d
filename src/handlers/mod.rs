//! # API Handlers
//!
//! HTTP endpoint handlers for the control plane. All `/v1` routes run
//! behind the auth middleware and receive a [`CustomerScope`]; JSON
//! bodies are limited to 1 MiB and reject unknown fields.

pub mod domains;
pub mod health;
pub mod services;
pub mod storm_policies;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;

use crate::auth::CustomerScope;
use crate::error::{map_db_err, not_found, ApiError};
use crate::models::service;
use crate::repositories;
use crate::server::AppState;

/// Unwraps a JSON body, mapping decode failures to 400.
pub(crate) fn decode_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())),
    }
}

/// Loads a service scoped to the caller, or 404.
pub(crate) async fn require_service(
    state: &AppState,
    scope: CustomerScope,
    service_id: i64,
) -> Result<service::Model, ApiError> {
    repositories::service::service_for_customer(&state.db, service_id, scope.customer_id)
        .await
        .map_err(|err| map_db_err("failed to load service", err))?
        .ok_or_else(|| not_found("service not found"))
}
