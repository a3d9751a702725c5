//! Shared helpers for producer integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rivven_ingest::{BatchTransport, Error, Record, RecordStatus, Result};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test logging (idempotent)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory stream service with scripted per-payload throttling
#[derive(Default)]
pub struct FlakyService {
    calls: Mutex<Vec<Vec<String>>>,
    throttle: Mutex<HashMap<String, u32>>,
    down_for_calls: Mutex<u32>,
    delivered: Mutex<Vec<String>>,
}

impl FlakyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Throttle the record carrying `payload` for its next `times` submissions
    pub fn throttle(&self, payload: &str, times: u32) {
        self.throttle.lock().insert(payload.to_string(), times);
    }

    /// Fail the next `n` calls with a connection error
    pub fn go_down(&self, n: u32) {
        *self.down_for_calls.lock() = n;
    }

    /// Payloads of every call, in call order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().iter().map(Vec::len).collect()
    }

    pub fn attempts_for(&self, payload: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.iter().any(|p| p == payload))
            .count()
    }

    /// Every payload the service acknowledged
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl BatchTransport for FlakyService {
    async fn put_records(&self, _stream: &str, records: &[Record]) -> Result<Vec<RecordStatus>> {
        let payloads: Vec<String> = records
            .iter()
            .map(|r| String::from_utf8_lossy(r.payload()).into_owned())
            .collect();
        self.calls.lock().push(payloads.clone());

        {
            let mut down = self.down_for_calls.lock();
            if *down > 0 {
                *down -= 1;
                return Err(Error::Connection("connection reset by peer".into()));
            }
        }

        let mut throttle = self.throttle.lock();
        let statuses = payloads
            .iter()
            .enumerate()
            .map(|(i, payload)| match throttle.get_mut(payload) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    RecordStatus::Error {
                        code: "ProvisionedThroughputExceededException".into(),
                        message: "Rate exceeded for shard".into(),
                        retryable: true,
                    }
                }
                _ => {
                    self.delivered.lock().push(payload.clone());
                    RecordStatus::Ok {
                        shard_id: "shardId-000000000000".into(),
                        sequence: i as u64,
                    }
                }
            })
            .collect();
        Ok(statuses)
    }
}
