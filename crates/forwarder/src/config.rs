//! Forwarder configuration
//!
//! Sources, later ones winning: built-in defaults, an optional config file,
//! then `FORWARDER__`-prefixed environment variables with `__` between path
//! segments (e.g. `FORWARDER__BULK__AUTO_FLUSH=true`).

use anyhow::{ensure, Context, Result};
use forwarder_lib::bulk::{ForwarderConfig, TransportConfig};
use forwarder_lib::index::{IndexConfig, IndexManager};
use forwarder_lib::poller::{DiscoveryConfig, DiscoveryKind};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "FORWARDER";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub poller: PollerSettings,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub bulk: ForwarderConfig,

    #[serde(default)]
    pub elasticsearch: ElasticsearchSettings,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upper bound on the final flush at shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    /// Paths scraped on every instance, in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Document store connection
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchSettings {
    #[serde(default = "default_es_host")]
    pub host: String,

    #[serde(default = "default_es_port")]
    pub port: u16,

    #[serde(default = "default_es_scheme")]
    pub scheme: String,

    #[serde(default = "default_es_timeout")]
    pub timeout_secs: u64,
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self {
            host: default_es_host(),
            port: default_es_port(),
            scheme: default_es_scheme(),
            timeout_secs: default_es_timeout(),
        }
    }
}

impl ElasticsearchSettings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["/admin/metrics".to_string()]
}

fn default_interval() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_es_host() -> String {
    "localhost".to_string()
}

fn default_es_port() -> u16 {
    9200
}

fn default_es_scheme() -> String {
    "http".to_string()
}

fn default_es_timeout() -> u64 {
    10
}

fn default_api_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl AppConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("poller.endpoints")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject settings the forwarder cannot start with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.poller.endpoints.is_empty(),
            "poller.endpoints must list at least one endpoint"
        );
        ensure!(
            self.poller.interval_secs > 0,
            "poller.interval_secs must be greater than zero"
        );
        ensure!(
            self.bulk.documents > 0,
            "bulk.documents must be greater than zero"
        );

        if self.discovery.kind == DiscoveryKind::Eureka {
            ensure!(
                self.discovery
                    .eureka_url
                    .as_deref()
                    .is_some_and(|url| !url.trim().is_empty()),
                "discovery.eureka_url is required when discovery.kind is eureka"
            );
        }

        IndexManager::new(self.index.clone()).context("Invalid index configuration")?;

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
