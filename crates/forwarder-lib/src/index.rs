//! Time-partitioned index naming
//!
//! Index names have the shape `<base>-<endpoint-slug>-<formatted time>`.
//! The time component comes from a strftime pattern validated once, when
//! the [`IndexManager`] is constructed.

use crate::error::IndexPatternError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default base index name
pub const DEFAULT_INDEX_NAME: &str = "microsvcmetrics";

/// Default time pattern (one index per day)
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// How often endpoint index names are resolved during a poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexResolution {
    /// Once at cycle start; every document of the cycle lands in the same index
    #[default]
    PerCycle,
    /// For every document, using its capture time
    PerDocument,
}

/// Index naming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub resolution: IndexResolution,
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            date_format: default_date_format(),
            resolution: IndexResolution::default(),
        }
    }
}

/// Source of the current time, replaceable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Resolves endpoint paths to target index names
#[derive(Debug, Clone)]
pub struct IndexManager {
    config: IndexConfig,
}

impl IndexManager {
    /// Create a manager, rejecting an empty base name or a malformed pattern
    pub fn new(config: IndexConfig) -> Result<Self, IndexPatternError> {
        if config.name.trim().is_empty() {
            return Err(IndexPatternError::EmptyName);
        }

        let malformed = config.date_format.is_empty()
            || StrftimeItems::new(&config.date_format).any(|item| matches!(item, Item::Error));
        if malformed {
            return Err(IndexPatternError::InvalidPattern(config.date_format));
        }

        Ok(Self { config })
    }

    pub fn resolution(&self) -> IndexResolution {
        self.config.resolution
    }

    /// Index name for `endpoint` at the current local time
    pub fn resolve(&self, endpoint: &str) -> String {
        self.resolve_at(endpoint, &SystemClock.now())
    }

    /// Index name for `endpoint` at instant `at`
    pub fn resolve_at(&self, endpoint: &str, at: &DateTime<FixedOffset>) -> String {
        format!(
            "{}-{}-{}",
            self.config.name,
            slugify_endpoint(endpoint),
            at.format(&self.config.date_format)
        )
    }

    /// Resolve every endpoint at one instant
    pub fn snapshot(&self, endpoints: &[String], at: &DateTime<FixedOffset>) -> IndexSnapshot {
        let names = endpoints
            .iter()
            .map(|endpoint| (endpoint.clone(), self.resolve_at(endpoint, at)))
            .collect();

        IndexSnapshot { names }
    }
}

/// Endpoint to index name mapping resolved at a single instant
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    names: HashMap<String, String>,
}

impl IndexSnapshot {
    pub fn get(&self, endpoint: &str) -> Option<&str> {
        self.names.get(endpoint).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Strip one leading `/` and turn the remaining separators into dashes
pub fn slugify_endpoint(endpoint: &str) -> String {
    endpoint
        .strip_prefix('/')
        .unwrap_or(endpoint)
        .replace('/', "-")
}
