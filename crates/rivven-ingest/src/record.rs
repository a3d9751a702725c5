//! Records, batches and the record encoder
//!
//! Application values become [`Record`]s through the [`RecordValue`] trait.
//! Raw bytes and strings are used as-is; any `Serialize` type can be sent as
//! JSON by wrapping it in [`Json`].

use crate::{Error, Result};
use bytes::Bytes;
use serde::Serialize;

/// Longest partition key accepted by the service
pub const MAX_PARTITION_KEY_LEN: usize = 256;

// ============================================================================
// Record
// ============================================================================

/// A single record on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    partition_key: String,
    payload: Bytes,
}

impl Record {
    /// Build a record without checking the limits
    pub(crate) fn new(partition_key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            partition_key: partition_key.into(),
            payload: payload.into(),
        }
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes counted against the batch ceiling
    pub fn size(&self) -> usize {
        self.payload.len() + self.partition_key.len()
    }
}

// ============================================================================
// Value Encoding
// ============================================================================

/// Conversion of an application value into record payload bytes
pub trait RecordValue {
    fn into_payload(self) -> Result<Bytes>;
}

impl RecordValue for Bytes {
    fn into_payload(self) -> Result<Bytes> {
        Ok(self)
    }
}

impl RecordValue for Vec<u8> {
    fn into_payload(self) -> Result<Bytes> {
        Ok(Bytes::from(self))
    }
}

impl RecordValue for &[u8] {
    fn into_payload(self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl RecordValue for String {
    fn into_payload(self) -> Result<Bytes> {
        Ok(Bytes::from(self))
    }
}

impl RecordValue for &str {
    fn into_payload(self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_bytes()))
    }
}

/// Encodes the wrapped value as JSON
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> RecordValue for Json<T> {
    fn into_payload(self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&self.0)?))
    }
}

/// Builds records and enforces the per-record limits
#[derive(Debug, Clone, Copy)]
pub struct RecordEncoder {
    max_record_bytes: usize,
}

impl RecordEncoder {
    pub fn new(max_record_bytes: usize) -> Self {
        Self { max_record_bytes }
    }

    /// Encode a value. Without a partition key a random one is generated so
    /// records spread across shards.
    pub fn encode<V: RecordValue>(&self, value: V, partition_key: Option<&str>) -> Result<Record> {
        let payload = value.into_payload()?;
        if payload.len() > self.max_record_bytes {
            return Err(Error::RecordTooLarge {
                size: payload.len(),
                max: self.max_record_bytes,
            });
        }

        let partition_key = match partition_key {
            Some(key) => {
                validate_partition_key(key)?;
                key.to_string()
            }
            None => random_partition_key(),
        };

        Ok(Record::new(partition_key, payload))
    }
}

fn validate_partition_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidPartitionKey(
            "partition key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_PARTITION_KEY_LEN {
        return Err(Error::InvalidPartitionKey(format!(
            "partition key is {} bytes (max: {})",
            key.len(),
            MAX_PARTITION_KEY_LEN
        )));
    }
    Ok(())
}

fn random_partition_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ============================================================================
// Batch
// ============================================================================

/// An ordered group of records submitted in one bulk call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
    size_bytes: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            size_bytes: 0,
        }
    }

    pub fn push(&mut self, record: Record) {
        self.size_bytes += record.size();
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Payload plus key bytes of all records
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        let size_bytes = records.iter().map(Record::size).sum();
        Self {
            records,
            size_bytes,
        }
    }
}

impl FromIterator<Record> for Batch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_with_key() {
        let encoder = RecordEncoder::new(1024);
        let record = encoder.encode("hello", Some("user-1")).unwrap();
        assert_eq!(record.partition_key(), "user-1");
        assert_eq!(record.payload(), &Bytes::from("hello"));
        assert_eq!(record.size(), 11);
    }

    #[test]
    fn test_encode_generates_random_key() {
        let encoder = RecordEncoder::new(1024);
        let a = encoder.encode(b"x".as_slice(), None).unwrap();
        let b = encoder.encode(b"x".as_slice(), None).unwrap();
        assert_eq!(a.partition_key().len(), 32);
        assert_ne!(a.partition_key(), b.partition_key());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let encoder = RecordEncoder::new(4);
        let err = encoder.encode(vec![0u8; 5], Some("k")).unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { size: 5, max: 4 }));

        // Exactly at the ceiling is fine
        assert!(encoder.encode(vec![0u8; 4], Some("k")).is_ok());
    }

    #[test]
    fn test_encode_rejects_bad_keys() {
        let encoder = RecordEncoder::new(1024);
        assert!(matches!(
            encoder.encode("v", Some("")),
            Err(Error::InvalidPartitionKey(_))
        ));

        let long_key = "k".repeat(MAX_PARTITION_KEY_LEN + 1);
        assert!(matches!(
            encoder.encode("v", Some(&long_key)),
            Err(Error::InvalidPartitionKey(_))
        ));
    }

    #[test]
    fn test_encode_json() {
        #[derive(Serialize)]
        struct Click {
            page: &'static str,
            count: u32,
        }

        let encoder = RecordEncoder::new(1024);
        let record = encoder
            .encode(
                Json(Click {
                    page: "/home",
                    count: 2,
                }),
                Some("k"),
            )
            .unwrap();
        assert_eq!(
            record.payload(),
            &Bytes::from(r#"{"page":"/home","count":2}"#)
        );
    }

    #[test]
    fn test_batch_tracks_size() {
        let encoder = RecordEncoder::new(1024);
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        batch.push(encoder.encode("value", Some("key")).unwrap());
        batch.push(encoder.encode("ab", Some("c")).unwrap());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.size_bytes(), 11);

        let rebuilt: Batch = batch.into_records().into_iter().collect();
        assert_eq!(rebuilt.size_bytes(), 11);
    }
}
