//! Retry loop over the failed subset of a batch
//!
//! Each cycle submits only the records that failed in the previous cycle.
//! Delivered records are settled and never sent again. Between cycles the
//! engine sleeps `base_delay * 2^attempt` on the calling task, so a backing
//! off batch holds up nothing but its own worker.

use crate::record::{Batch, Record};
use crate::stats::ProducerStats;
use crate::submitter::{BatchSubmitter, FailureReason, SubmitOutcome};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A record that will not be retried again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub record: Record,
    /// Reason reported by the last attempt
    pub reason: FailureReason,
    /// Submit attempts made for this record
    pub attempts: u32,
}

impl FailedRecord {
    /// True when the record ran out of retries rather than being rejected outright
    pub fn retries_exhausted(&self) -> bool {
        self.reason.is_retryable()
    }
}

/// Terminal result of one batch
#[derive(Debug, Default)]
pub struct RetryOutcome {
    pub delivered: usize,
    pub permanently_failed: Vec<FailedRecord>,
    /// Submit calls made for the batch
    pub attempts: u32,
}

/// Working set of an in-progress batch
struct RetryState {
    records: Vec<Record>,
    attempt: u32,
    next_delay: Duration,
}

/// Drives a batch through the submitter until delivered or out of retries
pub struct RetryEngine {
    submitter: BatchSubmitter,
    max_retries: u32,
    base_delay: Duration,
    stats: Arc<ProducerStats>,
}

impl RetryEngine {
    pub(crate) fn new(
        submitter: BatchSubmitter,
        max_retries: u32,
        base_delay: Duration,
        stats: Arc<ProducerStats>,
    ) -> Self {
        Self {
            submitter,
            max_retries,
            base_delay,
            stats,
        }
    }

    /// Backoff before retry cycle `attempt + 1`: `base_delay * 2^attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub async fn run(&self, batch: Batch) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        let mut state = RetryState {
            records: batch.into_records(),
            attempt: 0,
            next_delay: self.base_delay,
        };

        while !state.records.is_empty() {
            let outcomes = self.submitter.submit(&state.records).await;
            outcome.attempts += 1;

            let mut retryable = Vec::new();
            for (record, result) in std::mem::take(&mut state.records).into_iter().zip(outcomes) {
                match result {
                    SubmitOutcome::Delivered => outcome.delivered += 1,
                    SubmitOutcome::Failed(reason) if reason.is_retryable() => {
                        retryable.push((record, reason))
                    }
                    SubmitOutcome::Failed(reason) => {
                        warn!("Record rejected permanently: {}", reason);
                        outcome.permanently_failed.push(FailedRecord {
                            record,
                            reason,
                            attempts: state.attempt + 1,
                        });
                    }
                }
            }

            if retryable.is_empty() {
                break;
            }

            if state.attempt >= self.max_retries {
                warn!(
                    "{} records failed after {} attempts, giving up",
                    retryable.len(),
                    state.attempt + 1
                );
                outcome
                    .permanently_failed
                    .extend(retryable.into_iter().map(|(record, reason)| FailedRecord {
                        record,
                        reason,
                        attempts: state.attempt + 1,
                    }));
                break;
            }

            state.next_delay = self.backoff_delay(state.attempt);
            warn!(
                "{} records failed on attempt {}, retrying in {:?}",
                retryable.len(),
                state.attempt + 1,
                state.next_delay
            );
            sleep(state.next_delay).await;

            state.attempt += 1;
            state.records = retryable.into_iter().map(|(record, _)| record).collect();
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            "Batch resolved: {} delivered, {} failed, {} attempts",
            outcome.delivered,
            outcome.permanently_failed.len(),
            outcome.attempts
        );
        outcome
    }
}
