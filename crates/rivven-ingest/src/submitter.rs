//! Single bulk submit with per-record result mapping

use crate::protocol::RecordStatus;
use crate::record::Record;
use crate::stats::ProducerStats;
use crate::transport::BatchTransport;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Service codes that can never succeed on resubmission
const NON_RETRYABLE_CODES: &[&str] = &[
    "ValidationException",
    "InvalidArgumentException",
    "ResourceNotFoundException",
    "AccessDeniedException",
];

/// Why a record was not delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The bulk call itself failed; every record in it gets this reason
    Transport(String),
    /// Per-record rejection that may succeed later (throttling, internal error)
    Service { code: String, message: String },
    /// Per-record rejection that resubmitting can't fix
    Rejected { code: String, message: String },
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::Rejected { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(e) => write!(f, "transport error: {}", e),
            FailureReason::Service { code, message } => write!(f, "{}: {}", code, message),
            FailureReason::Rejected { code, message } => {
                write!(f, "{} (not retryable): {}", code, message)
            }
        }
    }
}

/// Result for one record of a submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered,
    Failed(FailureReason),
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered)
    }
}

impl From<RecordStatus> for SubmitOutcome {
    fn from(status: RecordStatus) -> Self {
        match status {
            RecordStatus::Ok { .. } => SubmitOutcome::Delivered,
            RecordStatus::Error {
                code,
                message,
                retryable,
            } => {
                if !retryable || NON_RETRYABLE_CODES.contains(&code.as_str()) {
                    SubmitOutcome::Failed(FailureReason::Rejected { code, message })
                } else {
                    SubmitOutcome::Failed(FailureReason::Service { code, message })
                }
            }
        }
    }
}

/// Performs exactly one bulk RPC per [`BatchSubmitter::submit`] call
pub struct BatchSubmitter {
    transport: Arc<dyn BatchTransport>,
    stream: String,
    stats: Arc<ProducerStats>,
}

impl BatchSubmitter {
    pub(crate) fn new(
        transport: Arc<dyn BatchTransport>,
        stream: impl Into<String>,
        stats: Arc<ProducerStats>,
    ) -> Self {
        Self {
            transport,
            stream: stream.into(),
            stats,
        }
    }

    /// Submit `records`, returning one outcome per record in order.
    ///
    /// Never fails: a transport error or a response that doesn't line up
    /// with the request marks every record as failed.
    pub async fn submit(&self, records: &[Record]) -> Vec<SubmitOutcome> {
        if records.is_empty() {
            return Vec::new();
        }

        self.stats.submit_calls.fetch_add(1, Ordering::Relaxed);

        match self.transport.put_records(&self.stream, records).await {
            Ok(statuses) if statuses.len() == records.len() => {
                let outcomes: Vec<SubmitOutcome> =
                    statuses.into_iter().map(SubmitOutcome::from).collect();
                debug!(
                    "Submitted {} records to {}, {} failed",
                    records.len(),
                    self.stream,
                    outcomes.iter().filter(|o| !o.is_delivered()).count()
                );
                outcomes
            }
            Ok(statuses) => {
                warn!(
                    "Malformed response from {}: {} statuses for {} records",
                    self.stream,
                    statuses.len(),
                    records.len()
                );
                all_failed(
                    records.len(),
                    FailureReason::Transport(format!(
                        "expected {} record statuses, got {}",
                        records.len(),
                        statuses.len()
                    )),
                )
            }
            Err(e) => {
                warn!(
                    "Bulk submit of {} records to {} failed: {}",
                    records.len(),
                    self.stream,
                    e
                );
                all_failed(records.len(), FailureReason::Transport(e.to_string()))
            }
        }
    }
}

fn all_failed(count: usize, reason: FailureReason) -> Vec<SubmitOutcome> {
    vec![SubmitOutcome::Failed(reason); count]
}
