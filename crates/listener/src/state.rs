use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::error::IngestError;
use crate::metrics::IngestMetrics;

/// One log record as received by the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedRecord {
    /// Token from the request query string.
    pub token: String,
    /// The `message` field, trailing line terminators removed.
    pub message: String,
    pub hostname: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Shared state behind the mock ingestion endpoint (thread-safe).
///
/// Cloning is cheap; all clones observe the same store.
#[derive(Clone)]
pub struct ListenerState {
    inner: Arc<Inner>,
    pub metrics: IngestMetrics,
}

struct Inner {
    /// Arrival order across all tokens. Writers hold this lock while touching
    /// `counts` so that a reset never interleaves with half a batch.
    records: RwLock<Vec<ReceivedRecord>>,
    /// message -> number of times it was received
    counts: DashMap<String, u64>,
    last_error: RwLock<Option<IngestError>>,
    status_override: RwLock<Option<StatusCode>>,
    default_status: StatusCode,
}

impl ListenerState {
    pub fn new(default_status: StatusCode) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: RwLock::new(Vec::new()),
                counts: DashMap::new(),
                last_error: RwLock::new(None),
                status_override: RwLock::new(None),
                default_status,
            }),
            metrics: IngestMetrics::new(),
        }
    }

    /// Store a parsed batch.
    pub fn ingest(&self, batch: Vec<ReceivedRecord>) {
        let mut records = self.inner.records.write();
        for record in &batch {
            *self.inner.counts.entry(record.message.clone()).or_insert(0) += 1;
        }
        records.extend(batch);
    }

    pub fn record_error(&self, err: IngestError) {
        tracing::warn!(error = %err, "Ingestion error recorded");
        *self.inner.last_error.write() = Some(err);
    }

    /// Drop every received record, the recorded error, the status override
    /// and the counters. Calling it repeatedly is the same as calling it once.
    pub fn reset(&self) {
        let mut records = self.inner.records.write();
        records.clear();
        self.inner.counts.clear();
        *self.inner.last_error.write() = None;
        *self.inner.status_override.write() = None;
        self.metrics.reset();
        tracing::debug!("Listener state reset");
    }

    pub fn has_received(&self, message: &str) -> bool {
        self.inner.counts.contains_key(message)
    }

    /// How many times `message` arrived. More than one means a duplicate delivery.
    pub fn count_of(&self, message: &str) -> u64 {
        self.inner.counts.get(message).map(|c| *c).unwrap_or(0)
    }

    /// Total records received, duplicates included.
    pub fn received_count(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Messages delivered under `token`, in arrival order.
    pub fn messages_for_token(&self, token: &str) -> Vec<String> {
        self.inner
            .records
            .read()
            .iter()
            .filter(|r| r.token == token)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn records(&self) -> Vec<ReceivedRecord> {
        self.inner.records.read().clone()
    }

    pub fn last_error(&self) -> Option<IngestError> {
        self.inner.last_error.read().clone()
    }

    /// Force every subsequent well-formed batch to be answered with `status`.
    /// `None` restores the configured default.
    pub fn set_status(&self, status: Option<StatusCode>) {
        *self.inner.status_override.write() = status;
    }

    pub fn response_status(&self) -> StatusCode {
        (*self.inner.status_override.read()).unwrap_or(self.inner.default_status)
    }
}

impl Default for ListenerState {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str, message: &str) -> ReceivedRecord {
        ReceivedRecord {
            token: token.to_string(),
            message: message.to_string(),
            hostname: None,
            log_type: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_ingest_and_query() {
        let state = ListenerState::default();
        state.ingest(vec![record("t1", "a_0"), record("t2", "b_0"), record("t1", "a_1")]);

        assert!(state.has_received("a_0"));
        assert!(state.has_received("b_0"));
        assert!(!state.has_received("a_2"));
        assert_eq!(state.received_count(), 3);
        assert_eq!(state.messages_for_token("t1"), vec!["a_0", "a_1"]);
        assert_eq!(state.messages_for_token("t3"), Vec::<String>::new());
    }

    #[test]
    fn test_duplicate_counting() {
        let state = ListenerState::default();
        state.ingest(vec![record("t", "x_0")]);
        state.ingest(vec![record("t", "x_0")]);
        assert_eq!(state.count_of("x_0"), 2);
        assert_eq!(state.count_of("x_1"), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let state = ListenerState::default();
        state.ingest(vec![record("t", "x_0")]);
        state.record_error(IngestError::MissingToken);
        state.set_status(Some(StatusCode::INTERNAL_SERVER_ERROR));

        state.reset();
        let after_once = (state.received_count(), state.last_error(), state.response_status());
        state.reset();
        let after_twice = (state.received_count(), state.last_error(), state.response_status());

        assert_eq!(after_once, (0, None, StatusCode::OK));
        assert_eq!(after_once, after_twice);
        assert!(!state.has_received("x_0"));
    }

    #[test]
    fn test_status_override() {
        let state = ListenerState::new(StatusCode::OK);
        assert_eq!(state.response_status(), StatusCode::OK);
        state.set_status(Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(state.response_status(), StatusCode::SERVICE_UNAVAILABLE);
        state.set_status(None);
        assert_eq!(state.response_status(), StatusCode::OK);
    }
}
