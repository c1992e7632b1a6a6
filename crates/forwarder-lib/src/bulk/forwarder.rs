//! Delivery of enriched documents to the bulk transport
//!
//! In `buffered` mode documents accumulate in a [`BulkCache`] and are flushed
//! either when the cache fills (auto-flush) or once at the end of each poll
//! cycle. In `direct` mode every document is submitted as its own payload.
//! Submissions are spawned and never awaited by the caller; the cache is
//! cleared before the store answers, so delivery is at most once.

use super::cache::{single_payload, BulkCache, BulkPayload, DEFAULT_DOCUMENTS_PER_BULK};
use super::transport::{BulkTransport, NDJSON_CONTENT_TYPE};
use crate::health::{components, HealthRegistry};
use crate::models::EnrichedDocument;
use crate::observability::{ForwarderMetrics, StructuredLogger};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How documents reach the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One request per document
    Direct,
    /// Accumulate in the bulk cache
    #[default]
    Buffered,
}

/// Bulk delivery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Documents per bulk request before the cache reports full
    #[serde(default = "default_documents")]
    pub documents: usize,
    /// Flush as soon as the cache is full instead of once per cycle
    #[serde(default)]
    pub auto_flush: bool,
}

fn default_documents() -> usize {
    DEFAULT_DOCUMENTS_PER_BULK
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            documents: DEFAULT_DOCUMENTS_PER_BULK,
            auto_flush: false,
        }
    }
}

/// Result of one bulk submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered,
    Failed,
}

/// Result of the final flush on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was buffered, or shutdown already ran
    Empty,
    Submitted(SubmitOutcome),
    /// The store did not answer before the deadline
    TimedOut,
}

/// Routes documents into the bulk cache or straight to the transport
///
/// Shared between the poll loop and shutdown; every method takes `&self`.
pub struct Forwarder {
    config: ForwarderConfig,
    cache: BulkCache,
    transport: Arc<dyn BulkTransport>,
    extra_headers: HeaderMap,
    metrics: ForwarderMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    shut_down: AtomicBool,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig, transport: Arc<dyn BulkTransport>) -> Self {
        Self {
            cache: BulkCache::new(config.documents),
            config,
            transport,
            extra_headers: HeaderMap::new(),
            metrics: ForwarderMetrics::new(),
            logger: StructuredLogger::new("forwarder"),
            health: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Headers sent with every bulk request in addition to the content type
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn cache(&self) -> &BulkCache {
        &self.cache
    }

    /// Hand one document over for delivery to `index`
    ///
    /// Returns the handle of any submission this triggered.
    pub fn forward(&self, index: &str, document: &EnrichedDocument) -> Option<JoinHandle<SubmitOutcome>> {
        if self.shut_down.load(Ordering::SeqCst) {
            warn!(index = %index, "Forwarder already shut down, dropping document");
            return None;
        }

        let json = match document.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(index = %index, error = %e, "Failed to serialize document");
                return None;
            }
        };

        match self.config.mode {
            DeliveryMode::Direct => Some(self.submit(single_payload(index, &json))),
            DeliveryMode::Buffered => {
                let full = match self.cache.append(index, json) {
                    Ok(full) => full,
                    Err(e) => {
                        warn!(index = %index, error = %e, "Dropping document after final drain");
                        return None;
                    }
                };
                self.metrics.set_buffer_documents(self.cache.document_count());

                if full && self.config.auto_flush {
                    debug!(threshold = self.cache.threshold(), "Bulk cache full, flushing");
                    self.flush()
                } else {
                    None
                }
            }
        }
    }

    /// End-of-cycle flush; only acts when buffering without auto-flush
    pub fn finish_cycle(&self) -> Option<JoinHandle<SubmitOutcome>> {
        if self.config.mode == DeliveryMode::Buffered && !self.config.auto_flush {
            self.flush()
        } else {
            None
        }
    }

    /// Drain the cache into one submission; an empty cache sends nothing
    pub fn flush(&self) -> Option<JoinHandle<SubmitOutcome>> {
        let payload = self.cache.drain()?;
        self.metrics.set_buffer_documents(0);
        Some(self.submit(payload))
    }

    /// Spawn a POST of `payload`; the outcome is logged and counted
    pub fn submit(&self, payload: BulkPayload) -> JoinHandle<SubmitOutcome> {
        let mut headers = self.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));

        let transport = Arc::clone(&self.transport);
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();
        let health = self.health.clone();

        tokio::spawn(async move {
            let documents = payload.documents;
            match transport.post_bulk(payload.body, headers).await {
                Ok(()) => {
                    metrics.inc_bulk_submissions();
                    logger.log_submission(documents);
                    if let Some(health) = health {
                        health.set_healthy(components::FORWARDER).await;
                    }
                    SubmitOutcome::Delivered
                }
                Err(e) => {
                    metrics.inc_bulk_failures();
                    logger.log_submission_failure(documents, &e.to_string());
                    if let Some(health) = health {
                        health
                            .set_degraded(components::FORWARDER, format!("Bulk submission failed: {}", e))
                            .await;
                    }
                    SubmitOutcome::Failed
                }
            }
        })
    }

    /// Flush remaining buffered documents once and wait at most `timeout`
    ///
    /// Later calls, and any `forward` after this, do nothing.
    pub async fn shutdown(&self, timeout: Duration) -> DrainOutcome {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return DrainOutcome::Empty;
        }

        // Closing and draining share one lock, so no racing append is stranded
        let Some(payload) = self.cache.close() else {
            return DrainOutcome::Empty;
        };
        self.metrics.set_buffer_documents(0);
        let handle = self.submit(payload);

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => DrainOutcome::Submitted(outcome),
            Ok(Err(e)) => {
                error!(error = %e, "Final bulk submission task failed");
                DrainOutcome::Submitted(SubmitOutcome::Failed)
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Final bulk submission did not complete before shutdown deadline"
                );
                DrainOutcome::TimedOut
            }
        }
    }
}
