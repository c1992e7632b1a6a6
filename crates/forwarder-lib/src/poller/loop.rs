//! Periodic poll loop
//!
//! Runs one [`PollCycle`] per tick until a shutdown signal arrives. A cycle
//! always runs to completion; ticks missed while it runs are skipped.

use super::{CycleReport, PollCycle};
use crate::health::{components, HealthRegistry};
use crate::observability::{ForwarderMetrics, StructuredLogger};
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between cycle starts (default: 60 seconds)
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

pub struct PollLoop {
    cycle: PollCycle,
    config: PollConfig,
    metrics: ForwarderMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl PollLoop {
    pub fn new(cycle: PollCycle, config: PollConfig) -> Self {
        Self {
            cycle,
            config,
            metrics: ForwarderMetrics::new(),
            logger: StructuredLogger::new("poller"),
            health: None,
        }
    }

    /// Run until `shutdown` fires or its sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            endpoints = ?self.cycle.endpoints(),
            "Starting poll loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop");
                    break;
                }
            }
        }
    }

    /// Run a single cycle and record its outcome
    pub async fn run_once(&self) -> Option<CycleReport> {
        let start = Instant::now();
        let result = self.cycle.run().await;
        let elapsed = start.elapsed();
        self.metrics.observe_poll_cycle(elapsed);

        match result {
            Ok(report) => {
                self.metrics.add_documents(report.documents);
                self.metrics.add_fetch_errors(report.fetch_errors);
                self.metrics.set_instances_polled(report.instances);
                self.logger.log_poll_cycle(
                    report.services,
                    report.instances,
                    report.documents,
                    report.fetch_errors,
                    report.submissions(),
                    elapsed,
                );

                if let Some(health) = &self.health {
                    health.set_healthy(components::POLLER).await;
                    if report.discovery_errors > 0 {
                        health
                            .set_degraded(
                                components::DISCOVERY,
                                format!(
                                    "Instance listing failed for {} service(s)",
                                    report.discovery_errors
                                ),
                            )
                            .await;
                    } else {
                        health.set_healthy(components::DISCOVERY).await;
                    }
                }

                Some(report)
            }
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Poll cycle failed"
                );
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::DISCOVERY, format!("{:#}", e))
                        .await;
                }
                None
            }
        }
    }
}

/// Builder for the poll loop
pub struct PollLoopBuilder {
    cycle: Option<PollCycle>,
    config: PollConfig,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl PollLoopBuilder {
    pub fn new() -> Self {
        Self {
            cycle: None,
            config: PollConfig::default(),
            logger: None,
            health: None,
        }
    }

    pub fn cycle(mut self, cycle: PollCycle) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<PollLoop> {
        let cycle = self
            .cycle
            .ok_or_else(|| anyhow::anyhow!("Poll cycle is required"))?;

        anyhow::ensure!(
            !self.config.interval.is_zero(),
            "Poll interval must be greater than zero"
        );

        let mut poll_loop = PollLoop::new(cycle, self.config);
        if let Some(logger) = self.logger {
            poll_loop.logger = logger;
        }
        poll_loop.health = self.health;
        Ok(poll_loop)
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
