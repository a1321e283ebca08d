//! # Control-plane server
//!
//! Axum router wiring for the HTTP API: health endpoints, the
//! authenticated `/v1` surface, OpenAPI document, the 1 MiB body limit,
//! and graceful shutdown.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{middleware, Json, Router};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa::OpenApi;

use crate::auth;
use crate::config::AppConfig;
use crate::handlers::{domains, health, services, storm_policies};

/// Requests larger than this are rejected.
const MAX_REQUEST_BODY_BYTES: usize = 1 << 20;

/// Shared resources for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
}

/// Builds the control-plane router.
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/{service_id}",
            get(services::get_service)
                .patch(services::update_service)
                .delete(services::delete_service),
        )
        .route(
            "/services/{service_id}/domains",
            get(domains::list_domains).post(domains::create_domain),
        )
        .route(
            "/services/{service_id}/domains/{domain_id}",
            axum::routing::delete(domains::delete_domain),
        )
        .route(
            "/services/{service_id}/storm-policies",
            get(storm_policies::list_storm_policies).post(storm_policies::create_storm_policy),
        )
        .route(
            "/services/{service_id}/storm-policies/{policy_id}",
            axum::routing::patch(storm_policies::update_storm_policy)
                .delete(storm_policies::delete_storm_policy),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/openapi.json", get(openapi))
        .nest("/v1", api)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Serves the control plane until the shutdown token fires.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let state = AppState {
        db,
        config: Arc::new(config),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// OpenAPI documentation for the control plane.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::healthz,
        crate::handlers::health::readyz,
        crate::handlers::services::list_services,
        crate::handlers::services::create_service,
        crate::handlers::services::get_service,
        crate::handlers::services::update_service,
        crate::handlers::services::delete_service,
        crate::handlers::domains::list_domains,
        crate::handlers::domains::create_domain,
        crate::handlers::domains::delete_domain,
        crate::handlers::storm_policies::list_storm_policies,
        crate::handlers::storm_policies::create_storm_policy,
        crate::handlers::storm_policies::update_storm_policy,
        crate::handlers::storm_policies::delete_storm_policy,
    ),
    components(schemas(
        crate::error::ApiError,
        crate::handlers::services::ServiceDto,
        crate::handlers::services::DomainDto,
        crate::handlers::services::StormPolicyDto,
        crate::handlers::services::ServiceDetailDto,
        crate::handlers::services::CreateServiceRequest,
        crate::handlers::services::UpdateServiceRequest,
        crate::handlers::domains::DomainRequest,
        crate::handlers::storm_policies::StormPolicyRequest,
        crate::handlers::storm_policies::StormPolicyPatchRequest,
    )),
    info(
        title = "Tranche Control Plane",
        description = "Multi-CDN failover and insurance control plane API",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
