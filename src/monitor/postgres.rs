//! SQL-backed availability store over the `probe_samples` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;

use super::{AvailabilityProvider, MetricsRecorder, MonitorError};
use crate::repositories::probe_sample;

/// Durable metrics backend; every sample becomes a `probe_samples` row
/// and availability is a windowed aggregate query.
pub struct PostgresMetrics {
    db: DatabaseConnection,
    empty_availability: f64,
}

impl PostgresMetrics {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_empty_default(db, 0.0)
    }

    pub fn with_empty_default(db: DatabaseConnection, empty_availability: f64) -> Self {
        Self {
            db,
            empty_availability,
        }
    }
}

#[async_trait]
impl MetricsRecorder for PostgresMetrics {
    async fn record_probe(
        &self,
        service_id: i64,
        target: &str,
        ok: bool,
        latency: Duration,
    ) -> Result<(), MonitorError> {
        let latency_ms = if latency > Duration::ZERO {
            Some(latency.as_millis().min(i32::MAX as u128) as i32)
        } else {
            None
        };
        probe_sample::insert_sample(&self.db, service_id, target, Utc::now(), ok, latency_ms)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityProvider for PostgresMetrics {
    async fn availability(&self, service_id: i64, window: Duration) -> Result<f64, MonitorError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let pooled = probe_sample::availability(&self.db, service_id, cutoff).await?;
        Ok(pooled.unwrap_or(self.empty_availability))
    }
}
