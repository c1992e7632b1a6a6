//! Metric forwarder library
//!
//! This crate provides the core functionality for:
//! - Discovering service instances and scraping their metrics endpoints
//! - Enriching metric payloads with instance metadata
//! - Buffering bulk-index instructions and flushing them to the document store
//! - Health checks and observability

pub mod api;
pub mod bulk;
pub mod error;
pub mod health;
pub mod index;
pub mod message;
pub mod models;
pub mod observability;
pub mod poller;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ForwarderMetrics, StructuredLogger};
