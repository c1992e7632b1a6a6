//! Core data models for the metric forwarder

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped metric payload scraped from one instance endpoint
pub type RawMetricSet = Map<String, Value>;

/// One running, addressable deployment of a service as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_id: String,
    pub host: String,
    pub port: u16,
    /// Base URI the metrics endpoints are appended to
    pub uri: String,
}

impl ServiceInstance {
    /// Create an instance reachable over plain HTTP at `host:port`
    pub fn new(service_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            uri: format!("http://{}:{}", host, port),
            service_id: service_id.into(),
            host,
            port,
        }
    }

    /// Override the base URI
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Full URL of a metrics endpoint on this instance
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.uri.trim_end_matches('/'), endpoint)
    }
}

/// Metric payload after enrichment, ready to be stored as one document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichedDocument(Map<String, Value>);

impl EnrichedDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the single-line JSON form used in bulk payloads
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_default_uri() {
        let instance = ServiceInstance::new("billing", "10.0.0.4", 8081);
        assert_eq!(instance.uri, "http://10.0.0.4:8081");
        assert_eq!(
            instance.endpoint_url("/admin/metrics"),
            "http://10.0.0.4:8081/admin/metrics"
        );
    }

    #[test]
    fn test_instance_uri_trailing_slash() {
        let instance =
            ServiceInstance::new("billing", "billing.local", 443).with_uri("https://billing.local/");
        assert_eq!(
            instance.endpoint_url("/metrics"),
            "https://billing.local/metrics"
        );
    }

    #[test]
    fn test_document_serializes_as_flat_object() {
        let mut fields = Map::new();
        fields.insert("mem.value".to_string(), Value::from(512));
        let doc = EnrichedDocument::new(fields);

        assert_eq!(doc.to_json().unwrap(), r#"{"mem.value":512}"#);
        assert_eq!(doc.len(), 1);
    }
}
