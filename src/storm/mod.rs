//! # Storm detection engine
//!
//! Every tick, each active service's policies are evaluated against the
//! windowed availability view. Dropping under the threshold opens a
//! durable storm event unless the policy's cooldown suppresses it;
//! recovering above the threshold closes the open event. The cooldown
//! only ever suppresses opening, never closing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::models::storm_policy;
use crate::monitor::{AvailabilityProvider, MonitorError};
use crate::repositories::{service, storm_event, storm_policy as policies};

/// Errors from one policy evaluation.
#[derive(Debug, Error)]
pub enum StormError {
    #[error("availability read failed: {0}")]
    Availability(#[from] MonitorError),
    #[error("storm store error: {0}")]
    Store(#[from] DbErr),
}

/// What a single policy evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Availability is healthy and nothing was open.
    Idle,
    /// A new storm event was inserted.
    Opened,
    /// Availability is still degraded and the event stays open.
    KeptOpen,
    /// The cooldown suppressed opening a new event.
    Suppressed,
    /// The open event was closed.
    Resolved,
}

type NowFn = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Periodic evaluator driving the per-(service, kind) state machine.
pub struct Engine {
    db: DatabaseConnection,
    view: Arc<dyn AvailabilityProvider>,
    tick_interval: Duration,
    now_fn: NowFn,
}

impl Engine {
    pub fn new(db: DatabaseConnection, view: Arc<dyn AvailabilityProvider>) -> Self {
        Self {
            db,
            view,
            tick_interval: Duration::from_secs(10),
            now_fn: Box::new(Utc::now),
        }
    }

    /// Overrides the clock (tests).
    pub fn with_now(mut self, now_fn: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now_fn = Box::new(now_fn);
        self
    }

    /// Runs ticks until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("storm engine started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.tick_interval) => {
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "storm tick failed");
                    }
                }
            }
        }
        info!("storm engine stopped");
    }

    /// One evaluation round over every active service and policy.
    /// Failures are isolated per service and per policy.
    pub async fn tick(&self) -> Result<(), StormError> {
        let services = service::active_services(&self.db).await?;

        for svc in services {
            let svc_policies = match policies::policies_for_service(&self.db, svc.id).await {
                Ok(p) => p,
                Err(err) => {
                    error!(error = ?err, service_id = svc.id, "failed to load storm policies");
                    continue;
                }
            };

            for policy in svc_policies {
                match self.evaluate_policy(svc.id, &policy).await {
                    Ok(outcome) => self.observe(svc.id, &policy.kind, outcome),
                    Err(err) => {
                        error!(
                            error = ?err,
                            service_id = svc.id,
                            kind = %policy.kind,
                            "policy evaluation failed"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluates one policy and applies the resulting transition.
    pub async fn evaluate_policy(
        &self,
        service_id: i64,
        policy: &storm_policy::Model,
    ) -> Result<Outcome, StormError> {
        let window = Duration::from_secs(policy.window_seconds.max(0) as u64);
        let availability = self.view.availability(service_id, window).await?;

        let active = storm_event::active_for_policy(&self.db, service_id, &policy.kind).await?;
        let now = (self.now_fn)();
        let cooldown = Duration::from_secs(policy.cooldown_seconds.max(0) as u64);

        if availability < policy.threshold_avail {
            if active.is_some() {
                return Ok(Outcome::KeptOpen);
            }

            if cooldown > Duration::ZERO {
                if let Some(last) =
                    storm_event::last_event(&self.db, service_id, &policy.kind).await?
                {
                    // A still-open row we did not observe above counts
                    // from its start instead.
                    let anchor = last.ended_at.unwrap_or(last.started_at);
                    let elapsed = (now - anchor.with_timezone(&Utc))
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if elapsed < cooldown {
                        return Ok(Outcome::Suppressed);
                    }
                }
            }

            storm_event::open_event(&self.db, service_id, &policy.kind, now).await?;
            info!(service_id, kind = %policy.kind, availability, "storm opened");
            return Ok(Outcome::Opened);
        }

        if let Some(active) = active {
            storm_event::resolve_event(&self.db, active.id, now).await?;
            info!(service_id, kind = %policy.kind, availability, "storm resolved");
            return Ok(Outcome::Resolved);
        }

        Ok(Outcome::Idle)
    }

    fn observe(&self, service_id: i64, kind: &str, outcome: Outcome) {
        let status = match outcome {
            Outcome::Opened => "opened",
            Outcome::Resolved => "resolved",
            Outcome::KeptOpen | Outcome::Suppressed | Outcome::Idle => {
                self.set_active_gauge(service_id, kind, outcome == Outcome::KeptOpen);
                return;
            }
        };

        let labels = vec![
            ("service_id", service_id.to_string()),
            ("kind", kind.to_string()),
            ("status", status.to_string()),
        ];
        metrics::counter!("tranche_storm_events_total", &labels).increment(1);
        self.set_active_gauge(service_id, kind, outcome == Outcome::Opened);
        debug!(service_id, kind, ?outcome, "storm policy evaluated");
    }

    fn set_active_gauge(&self, service_id: i64, kind: &str, active: bool) {
        let labels = vec![
            ("service_id", service_id.to_string()),
            ("kind", kind.to_string()),
        ];
        metrics::gauge!("tranche_storm_active", &labels).set(if active { 1.0 } else { 0.0 });
    }
}
