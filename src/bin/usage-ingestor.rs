//! Usage ingestor: pulls CDN traffic into aligned usage snapshots.

use std::sync::Arc;

use tranche::cdn::{CloudflareClient, Ingestor, UsageProvider};
use tranche::config::ConfigLoader;
use tranche::{db, health, shutdown, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config, "usage-ingestor")?;

    if config.cloudflare_api_token.is_empty() {
        anyhow::bail!("CLOUDFLARE_API_TOKEN is required");
    }

    let db = db::open(&config).await?;
    let shutdown = shutdown::shutdown_token();

    tokio::spawn(health::serve(
        config.metrics_addr_or("0.0.0.0:9095"),
        db.clone(),
        None,
        shutdown.clone(),
    ));

    let provider: Arc<dyn UsageProvider> = Arc::new(CloudflareClient::new(
        config.cloudflare_account_id.clone(),
        config.cloudflare_api_token.clone(),
    ));

    Ingestor::new(
        db,
        provider,
        config.usage_window,
        config.usage_lookback,
        config.usage_tick,
    )
    .run(shutdown)
    .await;
    Ok(())
}
