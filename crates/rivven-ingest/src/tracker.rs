//! Outstanding-work tracking and failure aggregation

use crate::retry::{FailedRecord, RetryOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Permanently failed records collected since the last flush
#[derive(Debug, Default)]
pub struct FailureReport {
    failed: Vec<FailedRecord>,
}

impl FailureReport {
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FailedRecord> {
        self.failed.iter()
    }

    pub fn into_records(self) -> Vec<FailedRecord> {
        self.failed
    }
}

impl IntoIterator for FailureReport {
    type Item = FailedRecord;
    type IntoIter = std::vec::IntoIter<FailedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.failed.into_iter()
    }
}

/// In-flight batch counter with a wait-for-zero rendezvous
#[derive(Default)]
pub(crate) struct OutstandingWork {
    in_flight: AtomicU64,
    idle: Notify,
    failures: Mutex<Vec<FailedRecord>>,
}

impl OutstandingWork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a dispatched batch
    pub(crate) fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Resolve a batch, keeping its permanent failures for the next report
    pub(crate) fn complete(&self, outcome: RetryOutcome) {
        if !outcome.permanently_failed.is_empty() {
            self.failures.lock().extend(outcome.permanently_failed);
        }
        self.release();
    }

    /// Undo [`Self::begin`] for a batch that never made it onto the queue
    pub(crate) fn cancel(&self) {
        self.release();
    }

    pub(crate) fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no batch is in flight
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between isn't missed
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Take the failures accumulated so far
    pub(crate) fn take_failures(&self) -> FailureReport {
        FailureReport {
            failed: std::mem::take(&mut *self.failures.lock()),
        }
    }

    fn release(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            self.idle.notify_waiters();
        }
    }
}
