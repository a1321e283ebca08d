//! Billing worker: mints invoices from unbilled usage snapshots.

use tranche::billing::{BillingConfig, Engine};
use tranche::config::ConfigLoader;
use tranche::{db, health, shutdown, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config, "billing-worker")?;

    let db = db::open(&config).await?;
    let shutdown = shutdown::shutdown_token();

    tokio::spawn(health::serve(
        config.metrics_addr_or("0.0.0.0:9094"),
        db.clone(),
        None,
        shutdown.clone(),
    ));

    let billing = BillingConfig {
        period: config.billing_period,
        rate_cents_per_gb: config.billing_rate_cents_per_gb,
        discount_rate: config.billing_discount_rate,
    };
    Engine::new(db, billing).run(shutdown).await;
    Ok(())
}
