//! One discovery, fetch, enrich and buffer pass

use super::{MetricsFetcher, ServiceDiscovery};
use crate::bulk::{Forwarder, SubmitOutcome};
use crate::index::{Clock, IndexManager, IndexResolution, SystemClock};
use crate::message::MessageBuilder;
use crate::models::RawMetricSet;
use crate::observability::StructuredLogger;
use anyhow::{ensure, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `error` value of the record synthesized for a failed fetch
pub const UNREACHABLE_ERROR: &str = "Instance not reachable";

/// Raw record standing in for the metrics of an instance that could not be scraped
pub fn unreachable_record(error: &anyhow::Error) -> RawMetricSet {
    let stacktrace = error
        .chain()
        .map(|cause| Value::from(cause.to_string()))
        .collect();

    let mut record = RawMetricSet::new();
    record.insert("error".to_string(), Value::from(UNREACHABLE_ERROR));
    record.insert("exceptionMsg".to_string(), Value::from(format!("{:#}", error)));
    record.insert("exceptionStacktrace".to_string(), Value::Array(stacktrace));
    record
}

/// Summary of one poll cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub services: usize,
    pub instances: usize,
    pub documents: usize,
    pub fetch_errors: usize,
    /// Services whose instance listing failed and were skipped
    pub discovery_errors: usize,
    /// Bulk submissions started during the cycle
    pub pending: Vec<JoinHandle<SubmitOutcome>>,
}

impl CycleReport {
    pub fn submissions(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every submission started during the cycle
    pub async fn join_submissions(&mut self) -> Vec<SubmitOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for handle in self.pending.drain(..) {
            outcomes.push(handle.await.unwrap_or(SubmitOutcome::Failed));
        }
        outcomes
    }
}

/// Discovers instances, scrapes their endpoints and hands documents to the forwarder
pub struct PollCycle {
    discovery: Arc<dyn ServiceDiscovery>,
    fetcher: Arc<dyn MetricsFetcher>,
    forwarder: Arc<Forwarder>,
    index_manager: Arc<IndexManager>,
    endpoints: Vec<String>,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,
}

impl PollCycle {
    pub fn new(
        discovery: Arc<dyn ServiceDiscovery>,
        fetcher: Arc<dyn MetricsFetcher>,
        forwarder: Arc<Forwarder>,
        index_manager: Arc<IndexManager>,
        endpoints: Vec<String>,
    ) -> Result<Self> {
        ensure!(!endpoints.is_empty(), "At least one metrics endpoint is required");

        Ok(Self {
            discovery,
            fetcher,
            forwarder,
            index_manager,
            endpoints,
            clock: Arc::new(SystemClock),
            logger: StructuredLogger::new("poller"),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Poll every endpoint of every discovered instance, in discovery order
    ///
    /// Fails only when the service list cannot be obtained; the buffer is
    /// left untouched in that case.
    pub async fn run(&self) -> Result<CycleReport> {
        let cycle_start = self.clock.now();
        let snapshot = match self.index_manager.resolution() {
            IndexResolution::PerCycle => {
                Some(self.index_manager.snapshot(&self.endpoints, &cycle_start))
            }
            IndexResolution::PerDocument => None,
        };

        let services = self
            .discovery
            .list_services()
            .await
            .context("Failed to list services")?;

        let mut report = CycleReport {
            services: services.len(),
            ..Default::default()
        };

        for service in &services {
            let instances = match self.discovery.list_instances(service).await {
                Ok(instances) => instances,
                Err(e) => {
                    warn!(
                        service = %service,
                        error = %format!("{:#}", e),
                        "Failed to list service instances, skipping service"
                    );
                    report.discovery_errors += 1;
                    continue;
                }
            };

            debug!(service = %service, instances = instances.len(), "Polling service");
            report.instances += instances.len();

            for instance in &instances {
                for endpoint in &self.endpoints {
                    let metrics = match self.fetcher.fetch(instance, endpoint).await {
                        Ok(metrics) => metrics,
                        Err(e) => {
                            self.logger.log_fetch_failure(
                                &instance.service_id,
                                &instance.endpoint_url(endpoint),
                                &e,
                            );
                            report.fetch_errors += 1;
                            unreachable_record(&e)
                        }
                    };

                    let captured_at = self.clock.now();
                    let document =
                        MessageBuilder::build_at(&metrics, endpoint, instance, &captured_at);

                    let index = match snapshot.as_ref().and_then(|s| s.get(endpoint)) {
                        Some(name) => name.to_string(),
                        None => self.index_manager.resolve_at(endpoint, &captured_at),
                    };

                    report.documents += 1;
                    if let Some(handle) = self.forwarder.forward(&index, &document) {
                        report.pending.push(handle);
                    }
                }
            }
        }

        if let Some(handle) = self.forwarder.finish_cycle() {
            report.pending.push(handle);
        }

        Ok(report)
    }
}
