//! # Billing engine
//!
//! Mints invoices from unbilled usage snapshots. Each run is one
//! transaction: claim snapshots (skipping rows other workers hold), join
//! them with overlapping storm events, apply the coverage-capped backup
//! discount, insert invoices and line items, and stamp every snapshot
//! with its invoice id. Any failure rolls the whole batch back, so a
//! snapshot is billed exactly once.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr,
    IsolationLevel, TransactionTrait,
};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::storm_event;
use crate::repositories::{invoice, storm_event as storm_events, storm_policy, usage_snapshot};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Errors from one billing run. Any error aborts the transaction.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing store error: {0}")]
    Store(#[from] DbErr),
}

/// Billing parameters; invalid values fall back to safe defaults.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// How far back a run looks for billable snapshots.
    pub period: Duration,
    /// Rate in cents per GiB of traffic.
    pub rate_cents_per_gb: i64,
    /// Fraction of the backup charge eligible for discounting.
    pub discount_rate: f64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(24 * 60 * 60),
            rate_cents_per_gb: 12,
            discount_rate: 0.0,
        }
    }
}

struct LineItem {
    service_id: i64,
    snapshot_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    primary_bytes: i64,
    backup_bytes: i64,
    coverage_factor: f64,
    amount_cents: i64,
    discount_cents: i64,
}

#[derive(Default)]
struct InvoiceBuilder {
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    subtotal: i64,
    discount: i64,
    total: i64,
    items: Vec<LineItem>,
}

impl InvoiceBuilder {
    fn push(&mut self, item: LineItem) {
        self.period_start = Some(match self.period_start {
            Some(start) => start.min(item.window_start),
            None => item.window_start,
        });
        self.period_end = Some(match self.period_end {
            Some(end) => end.max(item.window_end),
            None => item.window_end,
        });
        self.subtotal += item.amount_cents;
        self.discount += item.discount_cents;
        self.total += item.amount_cents - item.discount_cents;
        self.items.push(item);
    }
}

/// Transactional invoice minting engine.
pub struct Engine {
    db: DatabaseConnection,
    cfg: BillingConfig,
    tick_interval: Duration,
}

impl Engine {
    pub fn new(db: DatabaseConnection, cfg: BillingConfig) -> Self {
        let mut cfg = cfg;
        if cfg.period.is_zero() {
            cfg.period = Duration::from_secs(24 * 60 * 60);
        }
        if cfg.rate_cents_per_gb <= 0 {
            cfg.rate_cents_per_gb = 12;
        }
        if cfg.discount_rate < 0.0 {
            cfg.discount_rate = 0.0;
        }
        Self {
            db,
            cfg,
            tick_interval: Duration::from_secs(60),
        }
    }

    /// Runs billing passes until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("billing engine started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.tick_interval) => {
                    let started = Instant::now();
                    let result = self.run_once(Utc::now()).await;
                    observe_run(started.elapsed(), &result);
                    if let Err(err) = result {
                        error!(error = %err, "billing run failed");
                    }
                }
            }
        }
        info!("billing engine stopped");
    }

    /// One billing run anchored at `now`. Returns the number of invoices
    /// minted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, BillingError> {
        let since = now - chrono::Duration::from_std(self.cfg.period)
            .unwrap_or_else(|_| chrono::Duration::days(1));

        let txn = self.begin().await?;
        match self.bill(&txn, since, now).await {
            Ok(invoices) => {
                txn.commit().await?;
                Ok(invoices)
            }
            Err(err) => {
                // Nothing is persisted from a failed run.
                let _ = txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        // SQLite (tests) has neither isolation levels nor row locks.
        if self.db.get_database_backend() == DatabaseBackend::Postgres {
            self.db
                .begin_with_config(Some(IsolationLevel::Serializable), None)
                .await
        } else {
            self.db.begin().await
        }
    }

    async fn bill(
        &self,
        txn: &DatabaseTransaction,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, BillingError> {
        let snapshots = usage_snapshot::lock_unbilled(txn, since, now).await?;
        if snapshots.is_empty() {
            info!(run_at = %now, "billing run: no usage in window");
            return Ok(0);
        }

        let mut coverage_cache: HashMap<i64, f64> = HashMap::new();
        let mut builders: BTreeMap<i64, InvoiceBuilder> = BTreeMap::new();

        for snapshot in snapshots {
            let storms = storm_events::overlapping_window(
                txn,
                snapshot.service_id,
                snapshot.window_start,
                snapshot.window_end,
            )
            .await?;

            let max_coverage = match coverage_cache.get(&snapshot.service_id) {
                Some(&cached) => cached,
                None => {
                    let factor =
                        storm_policy::max_coverage_factor_for_service(txn, snapshot.service_id)
                            .await?
                            .unwrap_or(1.0);
                    coverage_cache.insert(snapshot.service_id, factor);
                    factor
                }
            };

            let fraction = coverage_ratio(snapshot.window_start, snapshot.window_end, &storms);
            let coverage = (fraction * max_coverage).min(max_coverage);

            let backup_charge = charge_for_bytes(snapshot.backup_bytes, self.cfg.rate_cents_per_gb);
            let line_subtotal =
                charge_for_bytes(snapshot.primary_bytes, self.cfg.rate_cents_per_gb) + backup_charge;
            let discount = ((backup_charge as f64 * self.cfg.discount_rate * coverage).round()
                as i64)
                .min(line_subtotal);

            builders
                .entry(snapshot.customer_id)
                .or_default()
                .push(LineItem {
                    service_id: snapshot.service_id,
                    snapshot_id: snapshot.id,
                    window_start: snapshot.window_start,
                    window_end: snapshot.window_end,
                    primary_bytes: snapshot.primary_bytes,
                    backup_bytes: snapshot.backup_bytes,
                    coverage_factor: coverage,
                    amount_cents: line_subtotal,
                    discount_cents: discount,
                });
        }

        let mut emitted = 0;
        for (customer_id, mut builder) in builders {
            builder.items.sort_by_key(|item| item.window_start);

            let period_start = builder.period_start.unwrap_or(since);
            let period_end = builder.period_end.unwrap_or(now);
            let minted = invoice::insert_invoice(
                txn,
                customer_id,
                period_start,
                period_end,
                builder.subtotal,
                builder.discount,
                builder.total,
            )
            .await?;

            for item in &builder.items {
                invoice::insert_line_item(
                    txn,
                    minted.id,
                    item.service_id,
                    item.window_start,
                    item.window_end,
                    item.primary_bytes,
                    item.backup_bytes,
                    item.coverage_factor,
                    item.amount_cents,
                    item.discount_cents,
                )
                .await?;
            }
            for item in &builder.items {
                usage_snapshot::mark_invoiced(txn, item.snapshot_id, minted.id).await?;
            }

            info!(
                invoice_id = minted.id,
                customer_id,
                line_items = builder.items.len(),
                total_cents = minted.total_cents,
                "generated invoice"
            );
            emitted += 1;
        }

        Ok(emitted)
    }
}

/// Charge in cents for a byte count at `rate` cents per GiB.
fn charge_for_bytes(bytes: i64, rate_cents_per_gb: i64) -> i64 {
    if bytes <= 0 {
        return 0;
    }
    let gb = bytes as f64 / BYTES_PER_GB;
    (gb * rate_cents_per_gb as f64).round() as i64
}

/// Fraction of [window_start, window_end) covered by the union of the
/// storm intervals, clipped to the window.
fn coverage_ratio(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    storms: &[storm_event::Model],
) -> f64 {
    let duration = (window_end - window_start).num_seconds() as f64;
    if duration <= 0.0 {
        return 0.0;
    }

    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(storms.len());
    for storm in storms {
        let start = storm.started_at.with_timezone(&Utc).max(window_start);
        let end = storm
            .ended_at
            .map(|ended| ended.with_timezone(&Utc))
            .unwrap_or(window_end)
            .min(window_end);
        if end < start {
            continue;
        }
        intervals.push((start, end));
    }
    if intervals.is_empty() {
        return 0.0;
    }

    intervals.sort_by_key(|(start, _)| *start);
    let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = vec![intervals[0]];
    for (start, end) in intervals.into_iter().skip(1) {
        let last = merged.last_mut().expect("merged is non-empty");
        if start > last.1 {
            merged.push((start, end));
        } else if end > last.1 {
            last.1 = end;
        }
    }

    let covered: f64 = merged
        .iter()
        .map(|(start, end)| (*end - *start).num_seconds() as f64)
        .sum();
    (covered.min(duration)) / duration
}

fn observe_run(elapsed: Duration, result: &Result<usize, BillingError>) {
    let status = if result.is_ok() { "success" } else { "error" };
    let labels = vec![("status", status.to_string())];
    metrics::histogram!("tranche_billing_run_seconds", &labels).record(elapsed.as_secs_f64());
    if let Ok(invoices) = result {
        metrics::counter!("tranche_billing_invoices_total", &labels).increment(*invoices as u64);
    }
}
