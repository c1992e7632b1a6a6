//! Observability infrastructure for the metric forwarder
//!
//! Provides:
//! - Prometheus metrics (poll cycle latency, documents, fetch errors, bulk submissions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Histogram buckets for poll cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ForwarderMetricsInner> = OnceLock::new();

struct ForwarderMetricsInner {
    poll_cycle_seconds: Histogram,
    documents: IntCounter,
    fetch_errors: IntCounter,
    bulk_submissions: IntCounter,
    bulk_failures: IntCounter,
    buffer_documents: IntGauge,
    instances_polled: IntGauge,
}

impl ForwarderMetricsInner {
    fn new() -> Self {
        Self {
            poll_cycle_seconds: register_histogram!(
                "metric_forwarder_poll_cycle_seconds",
                "Time spent running one discovery, fetch and buffer cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_cycle_seconds"),

            documents: register_int_counter!(
                "metric_forwarder_documents_total",
                "Total number of enriched documents produced"
            )
            .expect("Failed to register documents_total"),

            fetch_errors: register_int_counter!(
                "metric_forwarder_fetch_errors_total",
                "Total number of failed metrics endpoint fetches"
            )
            .expect("Failed to register fetch_errors_total"),

            bulk_submissions: register_int_counter!(
                "metric_forwarder_bulk_submissions_total",
                "Total number of bulk requests accepted by the document store"
            )
            .expect("Failed to register bulk_submissions_total"),

            bulk_failures: register_int_counter!(
                "metric_forwarder_bulk_failures_total",
                "Total number of bulk requests that failed"
            )
            .expect("Failed to register bulk_failures_total"),

            buffer_documents: register_int_gauge!(
                "metric_forwarder_buffer_documents",
                "Number of documents waiting in the bulk buffer"
            )
            .expect("Failed to register buffer_documents"),

            instances_polled: register_int_gauge!(
                "metric_forwarder_instances_polled",
                "Number of instances polled in the last cycle"
            )
            .expect("Failed to register instances_polled"),
        }
    }
}

/// Handle to the process-wide forwarder metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct ForwarderMetrics {
    _private: (),
}

impl Default for ForwarderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwarderMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForwarderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForwarderMetricsInner {
        GLOBAL_METRICS.get_or_init(ForwarderMetricsInner::new)
    }

    pub fn observe_poll_cycle(&self, elapsed: Duration) {
        self.inner().poll_cycle_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn add_documents(&self, count: usize) {
        self.inner().documents.inc_by(count as u64);
    }

    pub fn add_fetch_errors(&self, count: usize) {
        self.inner().fetch_errors.inc_by(count as u64);
    }

    pub fn inc_bulk_submissions(&self) {
        self.inner().bulk_submissions.inc();
    }

    pub fn inc_bulk_failures(&self) {
        self.inner().bulk_failures.inc();
    }

    pub fn set_buffer_documents(&self, count: usize) {
        self.inner().buffer_documents.set(count as i64);
    }

    pub fn set_instances_polled(&self, count: usize) {
        self.inner().instances_polled.set(count as i64);
    }
}

/// Structured logger for forwarder lifecycle and pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    source: String,
}

impl StructuredLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn log_startup(&self, version: &str, endpoints: &[String]) {
        info!(
            event = "forwarder_started",
            source = %self.source,
            version = %version,
            endpoints = ?endpoints,
            "Metric forwarder started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "forwarder_shutdown",
            source = %self.source,
            reason = %reason,
            "Metric forwarder shutting down"
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_poll_cycle(
        &self,
        services: usize,
        instances: usize,
        documents: usize,
        fetch_errors: usize,
        submissions: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "poll_cycle_completed",
            source = %self.source,
            services = services,
            instances = instances,
            documents = documents,
            fetch_errors = fetch_errors,
            submissions = submissions,
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll cycle complete"
        );
    }

    pub fn log_fetch_failure(&self, service_id: &str, url: &str, error: &anyhow::Error) {
        warn!(
            event = "fetch_failed",
            source = %self.source,
            service_id = %service_id,
            url = %url,
            error = %format!("{:#}", error),
            "Error fetching metrics endpoint, recording instance as not reachable"
        );
    }

    pub fn log_submission(&self, documents: usize) {
        info!(
            event = "bulk_submitted",
            source = %self.source,
            documents = documents,
            "Successfully submitted metrics"
        );
    }

    pub fn log_submission_failure(&self, documents: usize, error: &str) {
        error!(
            event = "bulk_submission_failed",
            source = %self.source,
            documents = documents,
            error = %error,
            "Error submitting metrics"
        );
    }
}
