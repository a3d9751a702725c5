//! In-memory transport for unit tests

use crate::protocol::RecordStatus;
use crate::record::Record;
use crate::transport::BatchTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Records every call; failures are scripted per payload or per call
#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Vec<Record>>>,
    /// payload -> remaining retryable failures
    fail_payloads: Mutex<HashMap<Bytes, u32>>,
    reject_payloads: Mutex<HashSet<Bytes>>,
    failing_calls: AtomicU32,
    truncate: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail the record carrying `payload` the next `times` submissions
    pub(crate) fn fail_payload(&self, payload: &str, times: u32) {
        self.fail_payloads
            .lock()
            .insert(Bytes::copy_from_slice(payload.as_bytes()), times);
    }

    /// Reject the record carrying `payload` with a non-retryable code
    pub(crate) fn reject_payload(&self, payload: &str) {
        self.reject_payloads
            .lock()
            .insert(Bytes::copy_from_slice(payload.as_bytes()));
    }

    /// Fail the next `n` calls at the transport level
    pub(crate) fn fail_calls(&self, n: u32) {
        self.failing_calls.store(n, Ordering::SeqCst);
    }

    pub(crate) fn truncate_responses(&self, truncate: bool) {
        self.truncate.store(truncate, Ordering::SeqCst);
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Record>> {
        self.calls.lock().clone()
    }

    /// Number of calls that carried `payload`
    pub(crate) fn attempts_for(&self, payload: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.iter().any(|r| r.payload().as_ref() == payload.as_bytes()))
            .count()
    }

    fn status_for(&self, record: &Record) -> RecordStatus {
        if self.reject_payloads.lock().contains(record.payload()) {
            return RecordStatus::Error {
                code: "ValidationException".into(),
                message: "malformed payload".into(),
                retryable: false,
            };
        }

        let mut fail_payloads = self.fail_payloads.lock();
        match fail_payloads.get_mut(record.payload()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                RecordStatus::Error {
                    code: "ProvisionedThroughputExceededException".into(),
                    message: "rate exceeded".into(),
                    retryable: true,
                }
            }
            _ => RecordStatus::Ok {
                shard_id: "shard-0".into(),
                sequence: 0,
            },
        }
    }
}

#[async_trait]
impl BatchTransport for MockTransport {
    async fn put_records(&self, _stream: &str, records: &[Record]) -> Result<Vec<RecordStatus>> {
        self.calls.lock().push(records.to_vec());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Connection("connection reset by peer".into()));
        }

        let mut statuses: Vec<RecordStatus> = records.iter().map(|r| self.status_for(r)).collect();
        if self.truncate.load(Ordering::SeqCst) {
            statuses.pop();
        }
        Ok(statuses)
    }
}
