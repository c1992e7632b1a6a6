//! Metric Forwarder - service metrics to Elasticsearch bulk ingestion
//!
//! Periodically discovers service instances, scrapes their metrics endpoints
//! and ships the enriched documents to the `_bulk` API.

use anyhow::{Context, Result};
use clap::Parser;
use forwarder_lib::{
    api::{self, AppState},
    bulk::{DrainOutcome, Forwarder, HttpBulkTransport},
    health::{components, HealthRegistry},
    index::IndexManager,
    observability::{ForwarderMetrics, StructuredLogger},
    poller::{create_discovery, HttpMetricsFetcher, PollCycle, PollLoopBuilder},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const FORWARDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Metric Forwarder
#[derive(Parser, Debug)]
#[command(name = "metric-forwarder", version, about)]
struct Args {
    /// Path to a configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "FORWARDER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let args = Args::parse();

    let config = config::AppConfig::load(args.config.as_deref())?;
    config.validate()?;
    info!(
        discovery = ?config.discovery.kind,
        mode = ?config.bulk.mode,
        documents_per_bulk = config.bulk.documents,
        auto_flush = config.bulk.auto_flush,
        "Forwarder configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::POLLER).await;
    health_registry.register(components::DISCOVERY).await;
    health_registry.register(components::FORWARDER).await;

    // Initialize metrics and logging
    let metrics = ForwarderMetrics::new();
    let logger = StructuredLogger::new("metric-forwarder");

    // Create bulk pipeline
    let index_manager =
        Arc::new(IndexManager::new(config.index.clone()).context("Invalid index configuration")?);

    let transport = Arc::new(HttpBulkTransport::new(
        &config.elasticsearch.transport_config(),
    )?);
    info!(bulk_url = %transport.bulk_url(), "Bulk transport ready");

    let forwarder = Arc::new(
        Forwarder::new(config.bulk.clone(), transport)
            .with_logger(logger.clone())
            .with_health(health_registry.clone()),
    );

    // Create discovery and fetcher
    let fetch_timeout = config.poller.fetch_timeout();
    let discovery = create_discovery(&config.discovery, fetch_timeout)?;
    let fetcher = Arc::new(HttpMetricsFetcher::new(fetch_timeout)?);

    let cycle = PollCycle::new(
        discovery,
        fetcher,
        Arc::clone(&forwarder),
        index_manager,
        config.poller.endpoints.clone(),
    )?
    .with_logger(logger.clone());

    // Build the poll loop
    let poll_loop = PollLoopBuilder::new()
        .cycle(cycle)
        .interval(config.poller.interval())
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    // Start API server
    let app_state = Arc::new(AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Start poll loop
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(poll_loop.run(shutdown_rx));

    logger.log_startup(FORWARDER_VERSION, &config.poller.endpoints);
    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;

    // The loop finishes its in-flight cycle before observing the signal
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Poll loop task failed");
    }

    // Flush whatever is still buffered
    match forwarder.shutdown(config.shutdown_timeout()).await {
        DrainOutcome::Empty => info!("No buffered documents at shutdown"),
        DrainOutcome::Submitted(outcome) => info!(outcome = ?outcome, "Final bulk submission finished"),
        DrainOutcome::TimedOut => warn!("Final bulk submission abandoned at shutdown deadline"),
    }

    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

/// Wait for SIGINT or SIGTERM and return which one arrived
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            Ok("SIGINT received")
        }
        _ = sigterm.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok("SIGINT received")
}
