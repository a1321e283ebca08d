//! Prober worker: probe scheduler plus storm detection engine.

use std::sync::Arc;

use tranche::config::ConfigLoader;
use tranche::monitor::{
    AvailabilityProvider, InMemoryMetrics, InstrumentedRecorder, ProbeConfig, Scheduler,
};
use tranche::{db, health, shutdown, storm, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config, "prober")?;

    let db = db::open(&config).await?;
    let shutdown = shutdown::shutdown_token();

    tokio::spawn(health::serve(
        config.metrics_addr_or("0.0.0.0:9092"),
        db.clone(),
        None,
        shutdown.clone(),
    ));

    let store = Arc::new(InMemoryMetrics::new());
    let recorder = Arc::new(InstrumentedRecorder::new(Arc::clone(&store)));

    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        recorder,
        ProbeConfig {
            path: config.probe_path.clone(),
            timeout: config.probe_timeout,
            ..ProbeConfig::default()
        },
    )?);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let view: Arc<dyn AvailabilityProvider> = store;
    storm::Engine::new(db.clone(), view).run(shutdown).await;

    scheduler_handle.await?;
    Ok(())
}
