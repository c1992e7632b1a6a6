//! Service discovery backends
//!
//! - [`StaticDiscovery`]: services declared up front, in order
//! - [`EurekaDiscovery`]: queries a Eureka server's REST API

use super::ServiceDiscovery;
use crate::models::ServiceInstance;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Which registry backs discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    #[default]
    Static,
    Eureka,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub kind: DiscoveryKind,
    #[serde(default)]
    pub eureka_url: Option<String>,
    #[serde(default)]
    pub services: Vec<StaticService>,
}

/// A statically declared service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticService {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<StaticInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticInstance {
    pub host: String,
    pub port: u16,
    /// Base URI, defaults to `http://<host>:<port>`
    #[serde(default)]
    pub uri: Option<String>,
}

/// Fixed registry; services are listed in declaration order
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    services: Vec<(String, Vec<ServiceInstance>)>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, name: impl Into<String>, instances: Vec<ServiceInstance>) -> Self {
        self.services.push((name.into(), instances));
        self
    }

    pub fn from_config(services: &[StaticService]) -> Self {
        services.iter().fold(Self::new(), |discovery, service| {
            let instances = service
                .instances
                .iter()
                .map(|declared| {
                    let instance = ServiceInstance::new(&service.name, &declared.host, declared.port);
                    match &declared.uri {
                        Some(uri) => instance.with_uri(uri),
                        None => instance,
                    }
                })
                .collect();
            discovery.with_service(&service.name, instances)
        })
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn list_services(&self) -> Result<Vec<String>> {
        Ok(self.services.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, instances)| instances.clone())
            .unwrap_or_default())
    }
}

/// Instance status that makes an instance eligible for polling
const STATUS_UP: &str = "UP";

/// Eureka REST client (`/apps`, `/apps/<name>`)
pub struct EurekaDiscovery {
    client: reqwest::Client,
    base_url: Url,
}

impl EurekaDiscovery {
    /// `base_url` is the Eureka REST root, e.g. `http://eureka:8761/eureka`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Eureka URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Invalid Eureka path: {}", path))?;

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .with_context(|| format!("Eureka request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Eureka returned an error for {}", url))?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode Eureka response from {}", url))
    }
}

#[async_trait]
impl ServiceDiscovery for EurekaDiscovery {
    async fn list_services(&self) -> Result<Vec<String>> {
        let apps: AppsResponse = self.get("apps").await?;
        let names: Vec<String> = apps
            .applications
            .application
            .into_vec()
            .into_iter()
            .map(|app| app.name)
            .collect();

        debug!(services = names.len(), "Listed Eureka applications");
        Ok(names)
    }

    async fn list_instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let app: AppResponse = self.get(&format!("apps/{}", service)).await?;

        Ok(app
            .application
            .instance
            .into_vec()
            .into_iter()
            .filter(|instance| instance.status.as_deref().map_or(true, |s| s == STATUS_UP))
            .map(|instance| {
                let resolved = ServiceInstance::new(service, instance.host_name, instance.port.value);
                match instance.home_page_url {
                    Some(uri) if !uri.is_empty() => resolved.with_uri(uri),
                    _ => resolved,
                }
            })
            .collect())
    }
}

/// Eureka serializes single-element lists as a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppsResponse {
    applications: Applications,
}

#[derive(Debug, Deserialize)]
struct Applications {
    #[serde(default)]
    application: OneOrMany<Application>,
}

#[derive(Debug, Deserialize)]
struct AppResponse {
    application: Application,
}

#[derive(Debug, Deserialize)]
struct Application {
    name: String,
    #[serde(default)]
    instance: OneOrMany<EurekaInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EurekaInstance {
    host_name: String,
    port: EurekaPort,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    home_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EurekaPort {
    #[serde(rename = "$")]
    value: u16,
}
