//! HTTP metrics fetcher

use super::MetricsFetcher;
use crate::error::FetchError;
use crate::models::{RawMetricSet, ServiceInstance};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use serde_json::Value;
use std::time::Duration;

/// Scrapes JSON metrics endpoints with a per-request timeout
pub struct HttpMetricsFetcher {
    client: reqwest::Client,
}

impl HttpMetricsFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl MetricsFetcher for HttpMetricsFetcher {
    async fn fetch(&self, instance: &ServiceInstance, endpoint: &str) -> Result<RawMetricSet> {
        let url = instance.endpoint_url(endpoint);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            }
            .into());
        }

        let body: Value = response.json().await.map_err(|source| FetchError::Decode {
            url: url.clone(),
            source,
        })?;

        match body {
            Value::Object(metrics) => Ok(metrics),
            _ => Err(FetchError::NotAnObject { url }.into()),
        }
    }
}
