//! Typed errors for the forwarding pipeline

use thiserror::Error;

/// Rejected index naming configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexPatternError {
    #[error("index base name must not be empty")]
    EmptyName,

    #[error("invalid index date format pattern '{0}'")]
    InvalidPattern(String),
}

/// Failure to hand a bulk payload to the document store
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bulk request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bulk endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure to scrape a metrics endpoint
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} did not return a JSON object")]
    NotAnObject { url: String },
}

/// The bulk cache was closed for shutdown and accepts no more documents
#[derive(Debug, Error, PartialEq, Eq)]
#[error("bulk cache is closed")]
pub struct CacheClosed;
