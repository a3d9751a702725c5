use std::sync::atomic::{AtomicU64, Ordering};

/// Producer counters, shared between the façade, the workers and the retry engine
#[derive(Debug, Default)]
pub(crate) struct ProducerStats {
    pub(crate) records_accepted: AtomicU64,
    pub(crate) records_delivered: AtomicU64,
    pub(crate) records_failed: AtomicU64,
    pub(crate) batches_dispatched: AtomicU64,
    pub(crate) submit_calls: AtomicU64,
    pub(crate) retries: AtomicU64,
}

impl ProducerStats {
    pub(crate) fn snapshot(&self) -> ProducerStatsSnapshot {
        ProducerStatsSnapshot {
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            submit_calls: self.submit_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Producer statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStatsSnapshot {
    /// Records accepted by `put`
    pub records_accepted: u64,
    /// Records acknowledged by the service
    pub records_delivered: u64,
    /// Records that failed permanently
    pub records_failed: u64,
    /// Batches handed to the dispatch pool
    pub batches_dispatched: u64,
    /// Bulk RPC calls made
    pub submit_calls: u64,
    /// Retry cycles run
    pub retries: u64,
}

impl ProducerStatsSnapshot {
    /// Calculate success rate over resolved records
    pub fn success_rate(&self) -> f64 {
        let resolved = self.records_delivered + self.records_failed;
        if resolved == 0 {
            1.0
        } else {
            self.records_delivered as f64 / resolved as f64
        }
    }

    /// Records accepted but not yet resolved
    pub fn pending(&self) -> u64 {
        self.records_accepted
            .saturating_sub(self.records_delivered + self.records_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = ProducerStatsSnapshot {
            records_accepted: 100,
            records_delivered: 90,
            records_failed: 5,
            batches_dispatched: 10,
            submit_calls: 13,
            retries: 3,
        };

        assert!((stats.success_rate() - 90.0 / 95.0).abs() < 0.001);
        assert_eq!(stats.pending(), 5);
    }

    #[test]
    fn test_stats_snapshot_zero_sent() {
        let stats = ProducerStatsSnapshot::default();
        assert!((stats.success_rate() - 1.0).abs() < 0.001);
        assert_eq!(stats.pending(), 0);
    }

    #[test]
    fn test_counters() {
        let stats = ProducerStats::default();
        stats.records_accepted.fetch_add(3, Ordering::Relaxed);
        stats.records_delivered.fetch_add(2, Ordering::Relaxed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.records_accepted, 3);
        assert_eq!(snapshot.pending(), 1);
    }
}
