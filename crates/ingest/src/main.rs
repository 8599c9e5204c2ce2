use std::sync::Arc;

use anyhow::{Context, Result};
use sydevents_catalog::{EventStore, InMemoryEventStore, PostgresEventStore};
use sydevents_ingest::adapter::builtin_sources;
use sydevents_ingest::telemetry::{init_telemetry, TelemetryConfig};
use sydevents_ingest::{build_adapters, CycleRunner, IngestConfig, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "sydevents_ingest=info,sydevents_catalog=info")
    init_telemetry(TelemetryConfig::from_env());

    tracing::info!("sydevents-ingest starting...");

    let config = IngestConfig::from_env().context("Invalid ingest configuration")?;

    let store: Arc<dyn EventStore> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresEventStore::connect(url, config.db_max_connections)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!(max_connections = config.db_max_connections, "Using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on exit)");
            Arc::new(InMemoryEventStore::new())
        }
    };

    let adapters = build_adapters(builtin_sources(), &config.fetch)
        .context("Failed to build source adapters")?;

    tracing::info!(
        sources = adapters.len(),
        schedule = %config.scheduler.schedule,
        cooldown_secs = config.runner.cooldown.as_secs(),
        staleness_window_secs = config.runner.sweep.staleness_window.as_secs(),
        "Starting scheduler"
    );

    let runner = CycleRunner::new(store, adapters, config.runner);
    let handle = Scheduler::new(runner, config.scheduler)
        .context("Failed to create scheduler")?
        .start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    handle.shutdown().await;

    tracing::info!("Ingest shutdown complete");
    Ok(())
}
