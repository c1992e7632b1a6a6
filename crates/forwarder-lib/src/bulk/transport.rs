//! HTTP transport to the document store `_bulk` API

use crate::error::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// Path of the bulk ingestion API, relative to the store base URL
pub const BULK_ENDPOINT: &str = "_bulk";

/// Content type of a bulk body
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Accepts rendered bulk payloads
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// POST `body` to the bulk endpoint with the given headers
    async fn post_bulk(&self, body: String, headers: HeaderMap) -> Result<(), TransportError>;
}

/// Connection settings for the document store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 9200,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}/", self.scheme, self.host, self.port)
    }
}

/// reqwest-backed bulk transport
pub struct HttpBulkTransport {
    client: reqwest::Client,
    bulk_url: Url,
}

impl HttpBulkTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Self::with_base_url(&config.base_url(), config.timeout)
    }

    /// Build a transport against an explicit base URL
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid document store URL: {}", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let bulk_url = base
            .join(BULK_ENDPOINT)
            .context("Failed to build bulk endpoint URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, bulk_url })
    }

    pub fn bulk_url(&self) -> &Url {
        &self.bulk_url
    }
}

#[async_trait]
impl BulkTransport for HttpBulkTransport {
    async fn post_bulk(&self, body: String, headers: HeaderMap) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.bulk_url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
