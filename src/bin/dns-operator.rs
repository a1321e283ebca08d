//! DNS operator: routing planner plus weighted-record reconciler.

use std::sync::Arc;

use tracing::error;
use tranche::config::ConfigLoader;
use tranche::dns::aws::SdkRoute53Api;
use tranche::dns::{DnsProvider, NoopProvider, Route53Provider, Route53ProviderConfig};
use tranche::routing::Reconciler;
use tranche::{db, health, shutdown, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config, "dns-operator")?;

    let db = db::open(&config).await?;
    let shutdown = shutdown::shutdown_token();

    let mut degraded = None;
    let provider: Arc<dyn DnsProvider> = if config.aws_region.is_empty() {
        Arc::new(NoopProvider)
    } else {
        let provider_cfg = Route53ProviderConfig {
            region: config.aws_region.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            session_token: config.aws_session_token.clone(),
            max_attempts: 0,
        };
        match SdkRoute53Api::connect(&provider_cfg).await {
            Ok(api) => Arc::new(Route53Provider::new(api, &provider_cfg)),
            Err(err) => {
                // Fail open: log intended weights instead of crashing the
                // operator, and report degraded readiness.
                error!(error = %err, "route53 initialization failed");
                degraded = Some("dns provider not initialized".to_string());
                Arc::new(NoopProvider)
            }
        }
    };

    tokio::spawn(health::serve(
        config.metrics_addr_or("0.0.0.0:9093"),
        db.clone(),
        degraded,
        shutdown.clone(),
    ));

    Reconciler::new(db, provider).run(shutdown).await;
    Ok(())
}
