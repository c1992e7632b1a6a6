//! Shared fakes for bulk delivery tests

use super::BulkTransport;
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One captured bulk request
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub body: String,
    pub headers: HeaderMap,
}

/// Transport that records every request instead of sending it
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            fail: false,
            delay: None,
        }
    }

    /// Records requests but answers every one with HTTP 500
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Records requests and answers after `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkTransport for RecordingTransport {
    async fn post_bulk(&self, body: String, headers: HeaderMap) -> Result<(), TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push(RecordedRequest { body, headers });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            Err(TransportError::Status {
                status: 500,
                body: "internal error".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_recording_transport_counts_calls() {
    let transport = RecordingTransport::new();
    transport
        .post_bulk("a\nb\n".to_string(), HeaderMap::new())
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.requests()[0].body, "a\nb\n");
}
