//! Thread-safe record accumulator
//!
//! The buffer hands back a full [`Batch`] from [`RecordBuffer::append`] as
//! soon as the count threshold is reached; the caller owns it from then on.

use crate::record::{Batch, Record};
use crate::{Error, Result};
use parking_lot::Mutex;

/// Bounded accumulator of encoded records
pub struct RecordBuffer {
    pending: Mutex<Batch>,
    batch_size: usize,
    max_record_bytes: usize,
    max_batch_bytes: usize,
}

impl RecordBuffer {
    pub fn new(batch_size: usize, max_record_bytes: usize, max_batch_bytes: usize) -> Self {
        Self {
            pending: Mutex::new(Batch::with_capacity(batch_size)),
            batch_size,
            max_record_bytes,
            max_batch_bytes,
        }
    }

    /// Append a record, returning a batch if one was detached.
    ///
    /// A batch is detached when the count reaches `batch_size`, or when the
    /// record would push the buffered bytes past `max_batch_bytes`; in the
    /// latter case the previous contents are returned and the record starts
    /// the next batch.
    pub fn append(&self, record: Record) -> Result<Option<Batch>> {
        let size = record.payload().len();
        if size > self.max_record_bytes {
            return Err(Error::RecordTooLarge {
                size,
                max: self.max_record_bytes,
            });
        }

        let mut pending = self.pending.lock();

        let overflow =
            !pending.is_empty() && pending.size_bytes() + record.size() > self.max_batch_bytes;
        let detached = overflow.then(|| self.take(&mut pending));

        pending.push(record);

        // Can't coincide with an overflow split: a non-empty buffer implies
        // batch_size >= 2, and the split leaves exactly one record behind.
        if pending.len() >= self.batch_size {
            return Ok(Some(self.take(&mut pending)));
        }

        Ok(detached)
    }

    /// Detach whatever is buffered, if anything
    pub fn drain(&self) -> Option<Batch> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            None
        } else {
            Some(self.take(&mut pending))
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.pending.lock().size_bytes()
    }

    fn take(&self, pending: &mut Batch) -> Batch {
        std::mem::replace(pending, Batch::with_capacity(self.batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record(key: &str, payload: &str) -> Record {
        Record::new(key, payload.to_string())
    }

    #[test]
    fn test_detaches_at_threshold() {
        let buffer = RecordBuffer::new(3, 1024, 1 << 20);

        assert!(buffer.append(record("k", "1")).unwrap().is_none());
        assert!(buffer.append(record("k", "2")).unwrap().is_none());
        let batch = buffer.append(record("k", "3")).unwrap().unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.records()[0].payload().as_ref(), b"1");
        assert_eq!(batch.records()[2].payload().as_ref(), b"3");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_partial() {
        let buffer = RecordBuffer::new(10, 1024, 1 << 20);
        assert!(buffer.drain().is_none());

        buffer.append(record("k", "a")).unwrap();
        buffer.append(record("k", "b")).unwrap();
        assert_eq!(buffer.len(), 2);

        let batch = buffer.drain().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(buffer.drain().is_none());
    }

    #[test]
    fn test_rejects_oversized_record() {
        let buffer = RecordBuffer::new(10, 4, 1024);
        let err = buffer.append(record("k", "12345")).unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { size: 5, max: 4 }));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_ceiling_splits_batches() {
        // Each record is 1 key byte + 4 payload bytes
        let buffer = RecordBuffer::new(100, 8, 12);

        assert!(buffer.append(record("k", "aaaa")).unwrap().is_none());
        assert!(buffer.append(record("k", "bbbb")).unwrap().is_none());
        assert_eq!(buffer.size_bytes(), 10);

        let batch = buffer.append(record("k", "cccc")).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.size_bytes(), 10);

        // The third record started the next batch
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.size_bytes(), 5);
    }

    #[test]
    fn test_concurrent_appends_conserve_records() {
        let buffer = Arc::new(RecordBuffer::new(7, 1024, 1 << 20));
        let batches = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                let batches = Arc::clone(&batches);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let payload = format!("{}-{}", t, i);
                        if let Some(batch) = buffer.append(record("k", &payload)).unwrap() {
                            batches.lock().push(batch);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        if let Some(batch) = buffer.drain() {
            batches.lock().push(batch);
        }

        let batches = batches.lock();
        let mut seen = HashSet::new();
        for batch in batches.iter() {
            assert!(batch.len() <= 7);
            for r in batch.records() {
                assert!(seen.insert(r.payload().clone()), "duplicate record");
            }
        }
        assert_eq!(seen.len(), 2000);
    }
}
