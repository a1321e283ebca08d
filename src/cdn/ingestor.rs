//! Usage ingestion engine.
//!
//! Each tick pulls per-host usage for the lookback range, drops rows for
//! unknown hosts or misaligned windows, aggregates per (service, window)
//! and upserts snapshots. The unique snapshot index makes repeated
//! ingestion of the same window idempotent; invoice_id is never touched
//! here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{truncate_to_window, CdnError, UsageProvider};
use crate::repositories::{service, service_domain, usage_snapshot};

/// Errors from one ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("usage window must be positive")]
    InvalidWindow,
    #[error("usage store error: {0}")]
    Store(#[from] DbErr),
    #[error("usage provider error: {0}")]
    Provider(#[from] CdnError),
}

/// Periodic task folding CDN usage into snapshots.
pub struct Ingestor {
    db: DatabaseConnection,
    provider: Arc<dyn UsageProvider>,
    window: Duration,
    lookback: Duration,
    tick_interval: Duration,
}

impl Ingestor {
    pub fn new(
        db: DatabaseConnection,
        provider: Arc<dyn UsageProvider>,
        window: Duration,
        lookback: Duration,
        tick_interval: Duration,
    ) -> Self {
        let window = if window.is_zero() {
            Duration::from_secs(3600)
        } else {
            window
        };
        Self {
            db,
            provider,
            window,
            lookback,
            tick_interval,
        }
    }

    /// Runs an immediate ingestion pass, then one per tick until
    /// `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(provider = self.provider.name(), "usage ingestor started");
        loop {
            if let Err(err) = self.run_once(Utc::now()).await {
                error!(error = %err, "usage ingestion tick failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.tick_interval) => {}
            }
        }
        info!("usage ingestor stopped");
    }

    /// One ingestion pass anchored at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<(), IngestError> {
        if self.window.is_zero() {
            return Err(IngestError::InvalidWindow);
        }

        let aligned_now = truncate_to_window(now, self.window);
        let window_start = aligned_now
            - chrono::Duration::from_std(self.lookback).unwrap_or_else(|_| chrono::Duration::zero());

        let services = service::active_services(&self.db).await?;
        if services.is_empty() {
            return Ok(());
        }

        let host_to_service = self.load_host_map(&services).await?;
        if host_to_service.is_empty() {
            warn!("no service domains configured; skipping usage ingestion");
            return Ok(());
        }

        let hosts: Vec<String> = host_to_service.keys().cloned().collect();
        let usages = self
            .provider
            .usage(window_start, aligned_now, self.window, &hosts)
            .await?;

        let window_chrono = chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let mut aggregates: HashMap<(i64, DateTime<Utc>), i64> = HashMap::new();

        for usage in usages {
            let Some(&service_id) = host_to_service.get(&usage.host) else {
                warn!(host = %usage.host, "usage for unknown host");
                continue;
            };
            let aligned = truncate_to_window(usage.window_start, self.window);
            if aligned != usage.window_start || usage.window_end != usage.window_start + window_chrono
            {
                warn!(
                    host = %usage.host,
                    window_start = %usage.window_start,
                    window_end = %usage.window_end,
                    "dropping misaligned usage window"
                );
                continue;
            }
            *aggregates.entry((service_id, usage.window_start)).or_insert(0) += usage.bytes;
        }

        let ingested = aggregates.len();
        for ((service_id, window_start), bytes) in aggregates {
            usage_snapshot::upsert_snapshot(
                &self.db,
                service_id,
                window_start,
                window_start + window_chrono,
                bytes,
                0,
            )
            .await?;
        }

        metrics::counter!("tranche_usage_windows_ingested_total").increment(ingested as u64);
        info!(windows = ingested, services = services.len(), "usage ingestion completed");
        Ok(())
    }

    /// Builds the host → service map from the domains of active services.
    async fn load_host_map(
        &self,
        services: &[crate::models::service::Model],
    ) -> Result<HashMap<String, i64>, IngestError> {
        let service_ids: std::collections::HashSet<i64> =
            services.iter().map(|s| s.id).collect();

        let domains = service_domain::all_domains(&self.db).await?;
        let mut host_to_service = HashMap::new();
        for domain in domains {
            if service_ids.contains(&domain.service_id) {
                host_to_service.insert(domain.name, domain.service_id);
            }
        }
        Ok(host_to_service)
    }
}
