//! DNS reconcile loop.
//!
//! Every interval (and once at startup) the desired weights for each
//! active service are pushed to the DNS provider for every domain. Each
//! provider call runs under its own operation timeout; failures are
//! logged and the loop moves on to the next domain.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dns::DnsProvider;
use crate::repositories::{service, service_domain};
use crate::routing;

/// Periodic task aligning DNS records with storm state.
pub struct Reconciler {
    db: DatabaseConnection,
    provider: Arc<dyn DnsProvider>,
    interval: Duration,
    op_timeout: Duration,
}

impl Reconciler {
    pub fn new(db: DatabaseConnection, provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            db,
            provider,
            interval: Duration::from_secs(15),
            op_timeout: Duration::from_secs(5),
        }
    }

    /// Runs reconcile rounds until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(provider = self.provider.name(), "dns reconciler started");
        self.reconcile_once().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.interval) => self.reconcile_once().await,
            }
        }
        info!("dns reconciler stopped");
    }

    /// One pass over every active service and domain.
    pub async fn reconcile_once(&self) {
        let services = match timeout(self.op_timeout, service::active_services(&self.db)).await {
            Ok(Ok(services)) => services,
            Ok(Err(err)) => {
                error!(error = ?err, "failed to list active services");
                return;
            }
            Err(_) => {
                error!("listing active services timed out");
                return;
            }
        };

        for svc in services {
            let weights = match routing::desired_routing(&self.db, svc.id).await {
                Ok(weights) => weights,
                Err(err) => {
                    error!(error = ?err, service_id = svc.id, "failed to plan routing");
                    continue;
                }
            };

            let domains = match service_domain::domains_for_service(&self.db, svc.id).await {
                Ok(domains) => domains,
                Err(err) => {
                    error!(error = ?err, service_id = svc.id, "failed to load domains");
                    continue;
                }
            };

            for domain in domains {
                let result = timeout(
                    self.op_timeout,
                    self.provider
                        .set_weights(&domain.name, weights.primary, weights.backup),
                )
                .await;

                let status = match &result {
                    Ok(Ok(())) => "success",
                    Ok(Err(err)) => {
                        error!(error = %err, domain = %domain.name, "set_weights failed");
                        "error"
                    }
                    Err(_) => {
                        error!(domain = %domain.name, "set_weights timed out");
                        "timeout"
                    }
                };

                let labels = vec![
                    ("provider", self.provider.name().to_string()),
                    ("domain", domain.name.clone()),
                    ("status", status.to_string()),
                ];
                metrics::counter!("tranche_dns_changes_total", &labels).increment(1);
            }
        }
    }
}
