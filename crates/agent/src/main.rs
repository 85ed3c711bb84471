//! Insight Agent - anomaly detection service for the cluster dashboard
//!
//! Runs the collection and evaluation scheduler and serves findings,
//! activity and recommendations over HTTP.

use anyhow::{Context, Result};
use insight_agent::{api, config::AgentConfig};
use insight_lib::{
    collector::{ClusterSource, DemoClusterSource},
    health::HealthRegistry,
    observability::{EngineMetrics, StructuredLogger},
    scheduler::Scheduler,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting insight-agent");

    let config = AgentConfig::load().context("Failed to load agent configuration")?;
    info!(node_name = %config.node_name, api_port = config.api_port, "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = EngineMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    // No cluster connection is wired in; run against the synthetic workloads
    let source = Arc::new(DemoClusterSource::new());
    let entities = source
        .list_entities()
        .await
        .context("Failed to list demo entities")?
        .len();

    let scheduler = Scheduler::builder()
        .source(source)
        .config(config.engine.clone())
        .health(health_registry.clone())
        .node_name(&config.node_name)
        .build()
        .context("Failed to build scheduler")?;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        scheduler.aggregator(),
    ));

    logger.log_startup(AGENT_VERSION, entities, config.engine.collection_interval());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");

    // Receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with an error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
