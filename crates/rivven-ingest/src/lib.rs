//! Client-side ingest buffer for partitioned stream services
//!
//! Records are accumulated into batches, submitted in bulk by a fixed pool of
//! workers, and partial failures are retried with exponential backoff. See
//! [`Producer`] for the entry point.

pub mod buffer;
pub mod config;
pub mod error;
pub mod pool;
pub mod producer;
pub mod protocol;
pub mod record;
pub mod retry;
pub mod stats;
pub mod submitter;
pub mod tracker;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ProducerConfig, ProducerConfigBuilder, MAX_BATCH_RECORDS};
pub use error::{Error, Result};
pub use pool::{BatchCallback, BatchReport};
pub use producer::Producer;
pub use protocol::{RecordStatus, Request, Response, WireRecord};
pub use record::{Batch, Json, Record, RecordEncoder, RecordValue, MAX_PARTITION_KEY_LEN};
pub use retry::{FailedRecord, RetryOutcome};
pub use stats::ProducerStatsSnapshot;
pub use submitter::{FailureReason, SubmitOutcome};
pub use tracker::FailureReport;
pub use transport::{BatchTransport, TcpTransport};
