//! Worker health listener.
//!
//! Background binaries expose `/healthz` and `/readyz` on their own
//! port. Readiness mirrors the control plane's DB check and can carry a
//! standing degradation reason (e.g. a DNS provider that failed to
//! initialize).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::db;

#[derive(Clone)]
struct HealthState {
    db: DatabaseConnection,
    degraded: Option<String>,
}

/// Serves health endpoints until the shutdown token fires. Bind or serve
/// failures are logged, not fatal; the worker keeps running without a
/// health listener.
pub async fn serve(
    addr: String,
    db: DatabaseConnection,
    degraded: Option<String>,
    shutdown: CancellationToken,
) {
    let state = HealthState { db, degraded };
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr, "failed to bind health listener");
            return;
        }
    };
    info!(addr, "health listener started");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        error!(error = %err, "health listener failed");
    }
}

async fn readyz(State(state): State<HealthState>) -> Result<&'static str, (StatusCode, String)> {
    if let Some(reason) = &state.degraded {
        return Err((StatusCode::SERVICE_UNAVAILABLE, reason.clone()));
    }
    db::ready(&state.db)
        .await
        .map_err(|err| (StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;
    Ok("ok")
}
