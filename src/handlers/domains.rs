//! Service domain handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use super::services::DomainDto;
use super::{decode_json, require_service};
use crate::auth::CustomerScope;
use crate::error::{map_db_err, not_found, validation_error, ApiError};
use crate::repositories;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DomainRequest {
    pub name: String,
}

impl DomainRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(validation_error(
                "invalid payload",
                serde_json::json!({ "name": "cannot be blank" }),
            ));
        }
        Ok(())
    }
}

/// List a service's domains.
#[utoipa::path(
    get,
    path = "/v1/services/{service_id}/domains",
    params(("service_id" = i64, Path, description = "Service id")),
    responses(
        (status = 200, description = "Domains", body = [DomainDto]),
        (status = 404, description = "Unknown service", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn list_domains(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
) -> Result<Json<Vec<DomainDto>>, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let domains = repositories::service_domain::domains_for_service(&state.db, service.id)
        .await
        .map_err(|err| map_db_err("failed to list domains", err))?;
    Ok(Json(domains.into_iter().map(DomainDto::from).collect()))
}

/// Add a domain to a service.
#[utoipa::path(
    post,
    path = "/v1/services/{service_id}/domains",
    params(("service_id" = i64, Path, description = "Service id")),
    request_body = DomainRequest,
    responses(
        (status = 201, description = "Domain added", body = DomainDto),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 409, description = "Duplicate domain", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn create_domain(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path(service_id): Path<i64>,
    body: Result<Json<DomainRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DomainDto>), ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let request = decode_json(body)?;
    request.validate()?;

    let domain =
        repositories::service_domain::insert_domain(&state.db, service.id, request.name.trim())
            .await
            .map_err(|err| map_db_err("failed to add domain", err))?;
    Ok((StatusCode::CREATED, Json(domain.into())))
}

/// Remove a domain.
#[utoipa::path(
    delete,
    path = "/v1/services/{service_id}/domains/{domain_id}",
    params(
        ("service_id" = i64, Path, description = "Service id"),
        ("domain_id" = i64, Path, description = "Domain id")
    ),
    responses(
        (status = 204, description = "Domain deleted"),
        (status = 404, description = "Unknown service or domain", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn delete_domain(
    State(state): State<AppState>,
    scope: CustomerScope,
    Path((service_id, domain_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let service = require_service(&state, scope, service_id).await?;
    let removed = repositories::service_domain::delete_domain(&state.db, domain_id, service.id)
        .await
        .map_err(|err| map_db_err("failed to delete domain", err))?;
    if removed == 0 {
        return Err(not_found("domain not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
