//! In-memory bulk instruction buffer
//!
//! Holds (action line, document line) pairs in insertion order until they are
//! drained into one `_bulk` payload. The line count is always even. Every
//! operation takes the same lock, so a drain never observes half a pair.

use crate::error::CacheClosed;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Document type marker written into every action line
pub const DOCUMENT_TYPE: &str = "timestamped-metric";

/// Default number of documents that makes the cache full
pub const DEFAULT_DOCUMENTS_PER_BULK: usize = 10;

/// Render the action-and-metadata line for a document bound to `index`
pub fn action_line(index: &str) -> String {
    format!(
        "{{ \"index\" : {{ \"_index\" : {}, \"_type\" : \"{}\" }} }}",
        Value::from(index),
        DOCUMENT_TYPE
    )
}

/// A rendered bulk body together with the number of documents it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPayload {
    pub body: String,
    pub documents: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    lines: Vec<String>,
    closed: bool,
}

/// Mutex-guarded buffer of bulk instruction lines
#[derive(Debug)]
pub struct BulkCache {
    threshold: usize,
    state: Mutex<CacheState>,
}

impl Default for BulkCache {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENTS_PER_BULK)
    }
}

impl BulkCache {
    /// Create a cache that reports full after `threshold` documents
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            state: Mutex::new(CacheState {
                lines: Vec::with_capacity(threshold * 2),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of documents at which the cache reports full
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append one instruction pair; returns whether the cache is now full
    ///
    /// Fails once the cache has been closed, so no document can land after
    /// the final drain.
    pub fn append(&self, index: &str, document_json: String) -> Result<bool, CacheClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(CacheClosed);
        }

        state.lines.push(action_line(index));
        state.lines.push(document_json);
        Ok(state.lines.len() >= self.threshold * 2)
    }

    /// Whether the buffered documents have reached the threshold
    pub fn is_full(&self) -> bool {
        self.lock().lines.len() >= self.threshold * 2
    }

    /// Newline-terminated rendering of every buffered line
    pub fn render(&self) -> String {
        render_lines(&self.lock().lines)
    }

    /// Drop every buffered line
    pub fn clear(&self) {
        self.lock().lines.clear();
    }

    /// Render and clear under a single lock acquisition
    pub fn drain(&self) -> Option<BulkPayload> {
        take_payload(&mut self.lock())
    }

    /// Drain and refuse further appends, under a single lock acquisition
    pub fn close(&self) -> Option<BulkPayload> {
        let mut state = self.lock();
        state.closed = true;
        take_payload(&mut state)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn document_count(&self) -> usize {
        self.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }
}

fn take_payload(state: &mut CacheState) -> Option<BulkPayload> {
    if state.lines.is_empty() {
        return None;
    }

    let payload = BulkPayload {
        body: render_lines(&state.lines),
        documents: state.lines.len() / 2,
    };
    state.lines.clear();

    Some(payload)
}

fn render_lines(lines: &[String]) -> String {
    let capacity = lines.iter().map(|line| line.len() + 1).sum();
    let mut body = String::with_capacity(capacity);
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    body
}

/// Render a single-document payload without touching any cache
pub fn single_payload(index: &str, document_json: &str) -> BulkPayload {
    BulkPayload {
        body: format!("{}\n{}\n", action_line(index), document_json),
        documents: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn assert_paired(body: &str) {
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len() % 2, 0, "odd line count in {:?}", body);
        for pair in lines.chunks(2) {
            assert!(pair[0].starts_with("{ \"index\""), "{:?}", pair);
            assert!(pair[1].starts_with("{\"i\":"), "{:?}", pair);
        }
    }

    #[test]
    fn test_action_line_wire_format() {
        assert_eq!(
            action_line("microsvcmetrics-metrics-2024-01-01"),
            r#"{ "index" : { "_index" : "microsvcmetrics-metrics-2024-01-01", "_type" : "timestamped-metric" } }"#
        );
    }

    #[test]
    fn test_action_line_escapes_index() {
        let line = action_line("odd\"name");
        assert!(line.contains(r#""_index" : "odd\"name""#));
    }

    #[test]
    fn test_append_reports_full_at_threshold() {
        let cache = BulkCache::new(2);

        assert!(!cache.append("idx", "{}".to_string()).unwrap());
        assert!(!cache.is_full());
        assert!(cache.append("idx", "{}".to_string()).unwrap());
        assert!(cache.is_full());
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.document_count(), 2);
    }

    #[test]
    fn test_render_keeps_order_and_does_not_mutate() {
        let cache = BulkCache::new(10);
        cache.append("a", r#"{"n.value":1}"#.to_string()).unwrap();
        cache.append("b", r#"{"n.value":2}"#.to_string()).unwrap();

        let rendered = cache.render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert!(rendered.ends_with('\n'));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], action_line("a"));
        assert_eq!(lines[1], r#"{"n.value":1}"#);
        assert_eq!(lines[2], action_line("b"));
        assert_eq!(lines[3], r#"{"n.value":2}"#);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_drain_clears_and_skips_empty() {
        let cache = BulkCache::default();
        assert_eq!(cache.drain(), None);

        cache.append("idx", "{}".to_string()).unwrap();
        let payload = cache.drain().unwrap();

        assert_eq!(payload.documents, 1);
        assert_eq!(payload.body.lines().count(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.drain(), None);
    }

    #[test]
    fn test_clear() {
        let cache = BulkCache::new(3);
        cache.append("idx", "{}".to_string()).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.render(), "");
    }

    #[test]
    fn test_close_drains_and_rejects_appends() {
        let cache = BulkCache::new(3);
        cache.append("idx", "{}".to_string()).unwrap();

        let payload = cache.close().unwrap();
        assert_eq!(payload.documents, 1);
        assert!(cache.is_closed());

        assert_eq!(cache.append("idx", "{}".to_string()), Err(CacheClosed));
        assert!(cache.is_empty());
        assert_eq!(cache.close(), None);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let cache = BulkCache::new(0);
        assert_eq!(cache.threshold(), 1);
        assert!(cache.append("idx", "{}".to_string()).unwrap());
    }

    #[test]
    fn test_single_payload() {
        let payload = single_payload("idx", r#"{"a.value":1}"#);
        assert_eq!(payload.documents, 1);
        assert_eq!(
            payload.body,
            format!("{}\n{}\n", action_line("idx"), r#"{"a.value":1}"#)
        );
    }

    #[test]
    fn test_concurrent_appends_keep_pairs_even() {
        let cache = Arc::new(BulkCache::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache
                            .append(&format!("idx-{}", worker), format!("{{\"i\":{}}}", i))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let payload = cache.drain().unwrap();
        assert_eq!(payload.documents, 400);
        assert_eq!(payload.body.lines().count(), 800);
        assert_paired(&payload.body);
    }

    #[test]
    fn test_drains_racing_appends_lose_nothing() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 2000;

        let cache = Arc::new(BulkCache::new(PER_WRITER * WRITERS));
        let writers_done = Arc::new(AtomicBool::new(false));

        let drainer = {
            let cache = Arc::clone(&cache);
            let writers_done = Arc::clone(&writers_done);
            std::thread::spawn(move || {
                let mut drained = 0;
                let mut drains = 0;
                loop {
                    let finished = writers_done.load(Ordering::SeqCst);
                    if let Some(payload) = cache.drain() {
                        assert_paired(&payload.body);
                        assert_eq!(payload.body.lines().count(), payload.documents * 2);
                        drained += payload.documents;
                        drains += 1;
                    }
                    if finished {
                        break;
                    }
                    std::thread::yield_now();
                }
                (drained, drains)
            })
        };

        let writers: Vec<_> = (0..WRITERS)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..PER_WRITER {
                        cache
                            .append(&format!("idx-{}", worker), format!("{{\"i\":{}}}", i))
                            .unwrap();
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        writers_done.store(true, Ordering::SeqCst);

        let (drained, drains) = drainer.join().unwrap();
        assert_eq!(drained, WRITERS * PER_WRITER);
        assert!(drains >= 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_close_racing_appends_strands_nothing() {
        let cache = Arc::new(BulkCache::new(10_000));

        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let mut accepted = 0;
                    for i in 0..1000 {
                        match cache.append(&format!("idx-{}", worker), format!("{{\"i\":{}}}", i)) {
                            Ok(_) => accepted += 1,
                            Err(CacheClosed) => break,
                        }
                    }
                    accepted
                })
            })
            .collect();

        std::thread::yield_now();
        let closed = cache.close().map_or(0, |payload| {
            assert_paired(&payload.body);
            payload.documents
        });

        let accepted: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(closed, accepted);
        assert!(cache.is_empty());
    }
}
