//! Metric message enrichment
//!
//! Turns a raw metric mapping into the stored document: every metric key gets
//! the value suffix, and the capture timestamp plus the identity of the
//! scraped instance are added as metadata fields.

use crate::models::{EnrichedDocument, RawMetricSet, ServiceInstance};
use chrono::{DateTime, FixedOffset, Local};
use serde_json::{Map, Value};

/// Suffix appended to every stored field name
pub const VALUE_SUFFIX: &str = ".value";

/// Capture timestamp pattern: milliseconds and numeric UTC offset
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f%z";

const META_TIMESTAMP: &str = "timestamp";
const META_ENDPOINT: &str = "endpoint";
const META_HOST: &str = "host";
const META_PORT: &str = "port";
const META_SERVICE_ID: &str = "serviceId";

/// Builds enriched documents from scraped metrics
pub struct MessageBuilder;

impl MessageBuilder {
    /// Enrich `metrics` using the current local time as capture instant
    pub fn build(
        metrics: &RawMetricSet,
        endpoint: &str,
        instance: &ServiceInstance,
    ) -> EnrichedDocument {
        Self::build_at(metrics, endpoint, instance, &Local::now().fixed_offset())
    }

    /// Enrich `metrics` with an explicit capture instant
    pub fn build_at(
        metrics: &RawMetricSet,
        endpoint: &str,
        instance: &ServiceInstance,
        captured_at: &DateTime<FixedOffset>,
    ) -> EnrichedDocument {
        let mut fields = Map::with_capacity(metrics.len() + 5);

        for (key, value) in metrics {
            fields.insert(suffixed(key), value.clone());
        }

        // Metadata goes in last and replaces any metric with the same name
        fields.insert(
            suffixed(META_TIMESTAMP),
            Value::from(captured_at.format(TIMESTAMP_FORMAT).to_string()),
        );
        fields.insert(suffixed(META_ENDPOINT), Value::from(endpoint));
        fields.insert(suffixed(META_HOST), Value::from(instance.host.as_str()));
        fields.insert(suffixed(META_PORT), Value::from(instance.port));
        fields.insert(
            suffixed(META_SERVICE_ID),
            Value::from(instance.service_id.as_str()),
        );

        EnrichedDocument::new(fields)
    }
}

fn suffixed(key: &str) -> String {
    format!("{}{}", key, VALUE_SUFFIX)
}
