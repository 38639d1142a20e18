use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ingestion counters for the mock endpoint.
#[derive(Clone, Default)]
pub struct IngestMetrics {
    inner: Arc<IngestMetricsInner>,
}

#[derive(Default)]
struct IngestMetricsInner {
    /// POST requests accepted (any status returned)
    batches: AtomicU64,

    /// Records stored across all batches
    records: AtomicU64,

    /// Request body bytes seen
    bytes: AtomicU64,

    /// Batches rejected because of an ingestion error
    rejected: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub batches: u64,
    pub records: u64,
    pub bytes: u64,
    pub rejected: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_accepted(&self, records: usize, bytes: usize) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        self.inner.records.fetch_add(records as u64, Ordering::Relaxed);
        self.inner.bytes.fetch_add(bytes as u64, Ordering::Relaxed);

        tracing::debug!(
            records = records,
            bytes = bytes,
            total_records = self.inner.records.load(Ordering::Relaxed),
            "Batch accepted"
        );
    }

    pub fn batch_rejected(&self, bytes: usize) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.inner.batches.load(Ordering::Relaxed),
            records: self.inner.records.load(Ordering::Relaxed),
            bytes: self.inner.bytes.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.inner.batches.store(0, Ordering::Relaxed);
        self.inner.records.store(0, Ordering::Relaxed);
        self.inner.bytes.store(0, Ordering::Relaxed);
        self.inner.rejected.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_reset() {
        let metrics = IngestMetrics::new();
        metrics.batch_accepted(3, 120);
        metrics.batch_accepted(2, 80);
        metrics.batch_rejected(10);

        let snap = metrics.snapshot();
        assert_eq!(snap.batches, 3);
        assert_eq!(snap.records, 5);
        assert_eq!(snap.bytes, 210);
        assert_eq!(snap.rejected, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
