//! Wire messages for the bulk-submit RPC
//!
//! Frames are a 4-byte big-endian length followed by a bincode body.
//! WARNING: variant order is part of the wire format; append only.

use crate::record::Record;
use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A record as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub partition_key: String,
    pub payload: Bytes,
}

impl From<&Record> for WireRecord {
    fn from(record: &Record) -> Self {
        Self {
            partition_key: record.partition_key().to_string(),
            payload: record.payload().clone(),
        }
    }
}

/// Per-record result, positionally aligned with the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Record appended
    Ok {
        /// Shard the record was routed to
        shard_id: String,
        /// Sequence number within the shard
        sequence: u64,
    },
    /// Record rejected
    Error {
        /// Service error code, e.g. `ProvisionedThroughputExceededException`
        code: String,
        message: String,
        /// False when resubmitting can't succeed
        retryable: bool,
    },
}

impl RecordStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RecordStatus::Ok { .. })
    }
}

/// Client requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Append a batch of records to a stream
    PutRecords {
        stream: String,
        records: Vec<WireRecord>,
    },

    /// Ping
    Ping,
}

/// Service responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Result of a bulk put
    PutRecordsResult {
        failed_record_count: u32,
        records: Vec<RecordStatus>,
    },

    /// Request-level error (unknown stream, malformed request, ...)
    Error { message: String },

    /// Pong
    Pong,
}

impl Request {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl Response {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
