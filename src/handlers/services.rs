//! Service CRUD handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{decode_json, require_service};
use crate::auth::CustomerScope;
use crate::error::{map_db_err, not_found, validation_error, ApiError};
use crate::models::{service, service_domain, storm_policy};
use crate::repositories;
use crate::server::AppState;

/// Service representation returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceDto {
    pub id: i64,
    pub customer_id: i64,
    pub name: String,
    pub primary_cdn: String,
    pub backup_cdn: String,
    pub created_at: chrono::DateTime<FixedOffset>,
}

impl From<service::Model> for ServiceDto {
    fn from(model: service::Model) -> Self {
        Self {
            id: model.id,
            customer_id: model.customer_id,
            name: model.name,
            primary_cdn: model.primary_cdn,
            backup_cdn: model.backup_cdn,
            created_at: model.created_at,
        }
    }
}

/// Domain representation returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct DomainDto {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
}

impl From<service_domain::Model> for DomainDto {
    fn from(model: service_domain::Model) -> Self {
        Self {
            id: model.id,
            service_id: model.service_id,
            name: model.name,
        }
    }
}

/// Storm policy representation returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct StormPolicyDto {
    pub id: i64,
    pub service_id: i64,
    pub kind: String,
    pub threshold_avail: f64,
    pub window_seconds: i32,
    pub cooldown_seconds: i32,
    pub max_coverage_factor: f64,
}

impl From<storm_policy::Model> for StormPolicyDto {
    fn from(model: storm_policy::Model) -> Self {
        Self {
            id: model.id,
            service_id: model.service_id,
            kind: model.kind,
            threshold_avail: model.threshold_avail,
            window_seconds: model.window_seconds,
            cooldown_seconds: model.cooldown_seconds,
            max_coverage_factor: model.max_coverage_factor,
        }
    }
}

/// Service with its domains and policies.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceDetailDto {
    pub service: ServiceDto,
    pub domains: Vec<DomainDto>,
    pub storm_policies: Vec<StormPolicyDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateServiceRequest {
    pub name: String,
    pub primary_cdn: String,
    pub backup_cdn: String,
}

impl CreateServiceRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errs = serde_json::Map::new();
        if self.name.trim().is_empty() {
            errs.insert("name".into(), "cannot be blank".into());
        }
        if self.primary_cdn.trim().is_empty() {
            errs.insert("primary_cdn".into(), "cannot be blank".into());
        }
        if self.backup_cdn.trim().is_empty() {
            errs.insert("backup_cdn".into(), "cannot be blank".into());
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
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub primary_cdn: Option<String>,
    pub backup_cdn: Option<String>,
}

impl UpdateServiceRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.is_none() && self.primary_cdn.is_none() && self.backup_cdn.is_none() {
            return Err(validation_error(
                "invalid payload",
                serde_json::json!({ "body": "at least one field is required" }),
            ));
        }
        let mut errs = serde_json::Map::new();
        for (field, value) in [
            ("name", &self.name),
            ("primary_cdn", &self.primary_cdn),
            ("backup_cdn", &self.backup_cdn),
        ] {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    errs.insert(field.into(), "cannot be blank".into());
                }
            }
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(validation_error("invalid payload", errs.into()))
        }
    }
}

/// List the caller's services.
#[utoipa::path(
    get,
    path = "/v1/services",
    responses(
        (status = 200, description = "Active services", body = [ServiceDto]),
        (status = 401, description = "Missing or invalid token", body = ApiError)
    ),
    tag = "services"
)]
pub async fn list_services(
    State(state): State<AppState>,
    scope: CustomerScope,
) -> Result<Json<Vec<ServiceDto>>, ApiError> {
    let services =
        repositories::service::active_services_for_customer(&state.db, scope.customer_id)
            .await
            .map_err(|err| map_db_err("failed to list services", err))?;
    Ok(Json(services.into_iter().map(ServiceDto::from).collect()))
}

/// Create a service.
#[utoipa::path(
    post,
    path = "/v1/services",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Service created", body = ServiceDto),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 409, description = "Duplicate service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn create_service(
    State(state): State<AppState>,
    scope: CustomerScope,
    body: Result<Json<CreateServiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ServiceDto>), ApiError> {
    let request = decode_json(body)?;
    request.validate()?;

    let service = repositories::service::insert_service(
        &state.db,
        scope.customer_id,
        request.name.trim(),
        request.primary_cdn.trim(),
        request.backup_cdn.trim(),
    )
    .await
    .map_err(|err| map_db_err("failed to create service", err))?;

    Ok((StatusCode::CREATED, Json(service.into())))
}

/// Fetch one service with its domains and storm policies.
#[utoipa::path(
    get,
    path = "/v1/services/{service_id}",
    params(("service_id" = i64, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service detail", body = ServiceDetailDto),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn get_service(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
) -> Result<Json<ServiceDetailDto>, ApiError> {
    let service = require_service(&state, scope, service_id).await?;

    let domains = repositories::service_domain::domains_for_service(&state.db, service.id)
        .await
        .map_err(|err| map_db_err("failed to load domains", err))?;
    let policies = repositories::storm_policy::policies_for_service(&state.db, service.id)
        .await
        .map_err(|err| map_db_err("failed to load storm policies", err))?;

    Ok(Json(ServiceDetailDto {
        service: service.into(),
        domains: domains.into_iter().map(DomainDto::from).collect(),
        storm_policies: policies.into_iter().map(StormPolicyDto::from).collect(),
    }))
}

/// Patch a service.
#[utoipa::path(
    patch,
    path = "/v1/services/{service_id}",
    params(("service_id" = i64, Path, description = "Service id")),
    request_body = UpdateServiceRequest,
    responses(
        (status = 200, description = "Updated service", body = ServiceDto),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn update_service(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
    body: Result<Json<UpdateServiceRequest>, JsonRejection>,
) -> Result<Json<ServiceDto>, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let request = decode_json(body)?;
    request.validate()?;

    let name = request.name.as_deref().map(str::trim).unwrap_or(&service.name);
    let primary = request
        .primary_cdn
        .as_deref()
        .map(str::trim)
        .unwrap_or(&service.primary_cdn);
    let backup = request
        .backup_cdn
        .as_deref()
        .map(str::trim)
        .unwrap_or(&service.backup_cdn);

    let updated =
        repositories::service::update_service(&state.db, service.id, name, primary, backup)
            .await
            .map_err(|err| map_db_err("failed to update service", err))?;
    Ok(Json(updated.into()))
}

/// Soft-delete a service.
#[utoipa::path(
    delete,
    path = "/v1/services/{service_id}",
    params(("service_id" = i64, Path, description = "Service id")),
    responses(
        (status = 204, description = "Service deleted"),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "services"
)]
pub async fn delete_service(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::service::soft_delete_service(
        &state.db,
        service_id,
        scope.customer_id,
        Utc::now(),
    )
    .await
    .map_err(|err| map_db_err("failed to delete service", err))?;

    match deleted {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("service not found")),
    }
}
