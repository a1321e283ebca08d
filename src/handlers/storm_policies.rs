//! Storm policy handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use super::services::StormPolicyDto;
use super::{decode_json, require_service};
use crate::auth::CustomerScope;
use crate::error::{map_db_err, not_found, validation_error, ApiError};
use crate::repositories;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StormPolicyRequest {
    pub kind: String,
    pub threshold_avail: f64,
    pub window_seconds: i32,
    #[serde(default)]
    pub cooldown_seconds: i32,
    pub max_coverage_factor: f64,
}

impl StormPolicyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errs = serde_json::Map::new();
        if self.kind.trim().is_empty() {
            errs.insert("kind".into(), "cannot be blank".into());
        }
        if self.threshold_avail <= 0.0 || self.threshold_avail > 1.0 {
            errs.insert("threshold_avail".into(), "must be between 0 and 1".into());
        }
        if self.window_seconds <= 0 {
            errs.insert("window_seconds".into(), "must be positive".into());
        }
        if self.cooldown_seconds < 0 {
            errs.insert("cooldown_seconds".into(), "cannot be negative".into());
        }
        if self.max_coverage_factor <= 0.0 {
            errs.insert("max_coverage_factor".into(), "must be positive".into());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(validation_error("invalid payload", errs.into()))
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StormPolicyPatchRequest {
    pub kind: Option<String>,
    pub threshold_avail: Option<f64>,
    pub window_seconds: Option<i32>,
    pub cooldown_seconds: Option<i32>,
    pub max_coverage_factor: Option<f64>,
}

impl StormPolicyPatchRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.kind.is_none()
            && self.threshold_avail.is_none()
            && self.window_seconds.is_none()
            && self.cooldown_seconds.is_none()
            && self.max_coverage_factor.is_none()
        {
            return Err(validation_error(
                "invalid payload",
                serde_json::json!({ "body": "at least one field is required" }),
            ));
        }
        let mut errs = serde_json::Map::new();
        if let Some(kind) = &self.kind {
            if kind.trim().is_empty() {
                errs.insert("kind".into(), "cannot be blank".into());
            }
        }
        if let Some(threshold) = self.threshold_avail {
            if threshold <= 0.0 || threshold > 1.0 {
                errs.insert("threshold_avail".into(), "must be between 0 and 1".into());
            }
        }
        if let Some(window) = self.window_seconds {
            if window <= 0 {
                errs.insert("window_seconds".into(), "must be positive".into());
            }
        }
        if let Some(cooldown) = self.cooldown_seconds {
            if cooldown < 0 {
                errs.insert("cooldown_seconds".into(), "cannot be negative".into());
            }
        }
        if let Some(factor) = self.max_coverage_factor {
            if factor <= 0.0 {
                errs.insert("max_coverage_factor".into(), "must be positive".into());
            }
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(validation_error("invalid payload", errs.into()))
        }
    }
}

/// List a service's storm policies.
#[utoipa::path(
    get,
    path = "/v1/services/{service_id}/storm-policies",
    params(("service_id" = i64, Path, description = "Service id")),
    responses(
        (status = 200, description = "Storm policies", body = [StormPolicyDto]),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "storm-policies"
)]
pub async fn list_storm_policies(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
) -> Result<Json<Vec<StormPolicyDto>>, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let policies = repositories::storm_policy::policies_for_service(&state.db, service.id)
        .await
        .map_err(|err| map_db_err("failed to list storm policies", err))?;
    Ok(Json(policies.into_iter().map(StormPolicyDto::from).collect()))
}

/// Create a storm policy.
#[utoipa::path(
    post,
    path = "/v1/services/{service_id}/storm-policies",
    params(("service_id" = i64, Path, description = "Service id")),
    request_body = StormPolicyRequest,
    responses(
        (status = 201, description = "Storm policy created", body = StormPolicyDto),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "storm-policies"
)]
pub async fn create_storm_policy(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
    body: Result<Json<StormPolicyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StormPolicyDto>), ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let request = decode_json(body)?;
    request.validate()?;

    let policy = repositories::storm_policy::insert_policy(
        &state.db,
        service.id,
        request.kind.trim(),
        request.threshold_avail,
        request.window_seconds,
        request.cooldown_seconds,
        request.max_coverage_factor,
    )
    .await
    .map_err(|err| map_db_err("failed to create storm policy", err))?;
    Ok((StatusCode::CREATED, Json(policy.into())))
}

/// Patch a storm policy.
#[utoipa::path(
    patch,
    path = "/v1/services/{service_id}/storm-policies/{policy_id}",
    params(
        ("service_id" = i64, Path, description = "Service id"),
        ("policy_id" = i64, Path, description = "Policy id")
    ),
    request_body = StormPolicyPatchRequest,
    responses(
        (status = 200, description = "Updated storm policy", body = StormPolicyDto),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 404, description = "Unknown service or policy", body = ApiError)
    ),
    tag = "storm-policies"
)]
pub async fn update_storm_policy(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path((service_id, policy_id)): Path<(i64, i64)>,
    body: Result<Json<StormPolicyPatchRequest>, JsonRejection>,
) -> Result<Json<StormPolicyDto>, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let mut existing =
        repositories::storm_policy::policy_for_service(&state.db, policy_id, service.id)
            .await
            .map_err(|err| map_db_err("failed to load storm policy", err))?
            .ok_or_else(|| not_found("storm policy not found"))?;

    let request = decode_json(body)?;
    request.validate()?;

    if let Some(kind) = request.kind {
        existing.kind = kind.trim().to_string();
    }
    if let Some(threshold) = request.threshold_avail {
        existing.threshold_avail = threshold;
    }
    if let Some(window) = request.window_seconds {
        existing.window_seconds = window;
    }
    if let Some(cooldown) = request.cooldown_seconds {
        existing.cooldown_seconds = cooldown;
    }
    if let Some(factor) = request.max_coverage_factor {
        existing.max_coverage_factor = factor;
    }

    let updated = repositories::storm_policy::update_policy(&state.db, existing)
        .await
        .map_err(|err| map_db_err("failed to update storm policy", err))?;
    Ok(Json(updated.into()))
}

/// Delete a storm policy.
#[utoipa::path(
    delete,
    path = "/v1/services/{service_id}/storm-policies/{policy_id}",
    params(
        ("service_id" = i64, Path, description = "Service id"),
        ("policy_id" = i64, Path, description = "Policy id")
    ),
    responses(
        (status = 204, description = "Storm policy deleted"),
        (status = 404, description = "Unknown service or policy", body = ApiError)
    ),
    tag = "storm-policies"
)]
pub async fn delete_storm_policy(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path((service_id, policy_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let removed = repositories::storm_policy::delete_policy(&state.db, policy_id, service.id)
        .await
        .map_err(|err| map_db_err("failed to delete storm policy", err))?;
    if removed == 0 {
        return Err(not_found("storm policy not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
