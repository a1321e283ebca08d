//! # Probe monitoring
//!
//! The probe scheduler keeps one sampling loop per (service, domain,
//! label) target and records outcomes through [`MetricsRecorder`].
//! Availability over a window is read back through
//! [`AvailabilityProvider`]; two backends exist, an in-process ring with
//! read-time expiry and a SQL aggregate over `probe_samples`.

pub mod in_memory;
pub mod postgres;
pub mod scheduler;

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

pub use in_memory::InMemoryMetrics;
pub use postgres::PostgresMetrics;
pub use scheduler::{ProbeConfig, Scheduler};

/// Errors surfaced by metrics backends.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("metrics store error: {0}")]
    Store(#[from] DbErr),
}

/// Sink for individual probe outcomes.
#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    async fn record_probe(
        &self,
        service_id: i64,
        target: &str,
        ok: bool,
        latency: Duration,
    ) -> Result<(), MonitorError>;
}

/// Windowed availability reads used by the storm engine.
#[async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Pooled ok-fraction in [0, 1] over samples inside `window`, or the
    /// backend's configured empty default when no target has samples.
    async fn availability(&self, service_id: i64, window: Duration) -> Result<f64, MonitorError>;
}

#[async_trait]
impl<T: MetricsRecorder + ?Sized> MetricsRecorder for std::sync::Arc<T> {
    async fn record_probe(
        &self,
        service_id: i64,
        target: &str,
        ok: bool,
        latency: Duration,
    ) -> Result<(), MonitorError> {
        (**self).record_probe(service_id, target, ok, latency).await
    }
}

/// Recorder wrapper that mirrors every sample into the metrics facade
/// before handing it to the backing store.
pub struct InstrumentedRecorder<R> {
    inner: R,
}

impl<R> InstrumentedRecorder<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: MetricsRecorder> MetricsRecorder for InstrumentedRecorder<R> {
    async fn record_probe(
        &self,
        service_id: i64,
        target: &str,
        ok: bool,
        latency: Duration,
    ) -> Result<(), MonitorError> {
        let result = if ok { "success" } else { "failure" };
        let labels = vec![
            ("service_id", service_id.to_string()),
            ("target", target.to_string()),
            ("result", result.to_string()),
        ];
        metrics::counter!("tranche_probe_results_total", &labels).increment(1);
        metrics::histogram!("tranche_probe_latency_seconds", &labels[..2]).record(latency.as_secs_f64());

        self.inner.record_probe(service_id, target, ok, latency).await
    }
}
