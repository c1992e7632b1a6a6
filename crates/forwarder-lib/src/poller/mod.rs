//! Service polling
//!
//! This module discovers service instances, scrapes their metrics endpoints
//! and hands the enriched documents to the bulk forwarder. The registry and
//! HTTP client sit behind [`ServiceDiscovery`] and [`MetricsFetcher`] so a
//! poll cycle can run against fakes.

mod cycle;
mod discovery;
mod fetch;
mod r#loop;


pub use cycle::{unreachable_record, CycleReport, PollCycle, UNREACHABLE_ERROR};
pub use discovery::{
    DiscoveryConfig, DiscoveryKind, EurekaDiscovery, StaticDiscovery, StaticInstance,
    StaticService,
};
pub use fetch::HttpMetricsFetcher;
pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder};

use crate::models::{RawMetricSet, ServiceInstance};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;

/// Registry of running services
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Names of every registered service
    async fn list_services(&self) -> Result<Vec<String>>;

    /// Addressable instances of one service
    async fn list_instances(&self, service: &str) -> Result<Vec<ServiceInstance>>;
}

/// Scrapes one metrics endpoint of one instance
#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    async fn fetch(&self, instance: &ServiceInstance, endpoint: &str) -> Result<RawMetricSet>;
}

/// Create the discovery backend selected by configuration
pub fn create_discovery(
    config: &DiscoveryConfig,
    timeout: Duration,
) -> Result<Arc<dyn ServiceDiscovery>> {
    match config.kind {
        DiscoveryKind::Static => {
            tracing::info!(
                services = config.services.len(),
                "Using static service registry"
            );
            Ok(Arc::new(StaticDiscovery::from_config(&config.services)))
        }
        DiscoveryKind::Eureka => {
            let url = config
                .eureka_url
                .as_deref()
                .context("discovery.eureka_url is required for Eureka discovery")?;
            tracing::info!(eureka_url = %url, "Using Eureka service registry");
            Ok(Arc::new(EurekaDiscovery::new(url, timeout)?))
        }
    }
}
