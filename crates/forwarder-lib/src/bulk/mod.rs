//! Bulk buffering and submission to the document store
//!
//! Documents are paired with an action line naming their target index,
//! buffered in a [`BulkCache`], and shipped to the `_bulk` API through a
//! [`BulkTransport`].

mod cache;
mod forwarder;
mod transport;

#[cfg(test)]
pub(crate) mod tests;

pub use cache::{
    action_line, single_payload, BulkCache, BulkPayload, DEFAULT_DOCUMENTS_PER_BULK,
    DOCUMENT_TYPE,
};
pub use forwarder::{DeliveryMode, DrainOutcome, Forwarder, ForwarderConfig, SubmitOutcome};
pub use transport::{
    BulkTransport, HttpBulkTransport, TransportConfig, BULK_ENDPOINT, NDJSON_CONTENT_TYPE,
};
