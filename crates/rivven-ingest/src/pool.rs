//! Fixed-size dispatch pool
//!
//! Batches go through a bounded channel to `threads` long-lived worker tasks.
//! A worker owns a batch from dequeue until the retry engine resolves it, so
//! no two workers ever see the same batch. When the queue is full,
//! [`DispatchPool::submit_batch`] waits for capacity instead of dropping.

use crate::record::Batch;
use crate::retry::{FailedRecord, RetryEngine, RetryOutcome};
use crate::stats::ProducerStats;
use crate::submitter::FailureReason;
use crate::tracker::OutstandingWork;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Summary of one resolved batch, passed to the batch callback
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Records in the batch as dispatched
    pub records: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Submit calls made for the batch
    pub attempts: u32,
    pub completed_at: SystemTime,
}

/// Invoked by a worker after each batch resolves
pub type BatchCallback = Arc<dyn Fn(&BatchReport) + Send + Sync>;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Batch>>>;

pub(crate) struct DispatchPool {
    queue: Mutex<Option<mpsc::Sender<Batch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    tracker: Arc<OutstandingWork>,
    stats: Arc<ProducerStats>,
}

impl DispatchPool {
    /// Spawn `threads` workers. Must be called within a tokio runtime.
    pub(crate) fn new(
        threads: usize,
        queue_capacity: usize,
        engine: Arc<RetryEngine>,
        tracker: Arc<OutstandingWork>,
        stats: Arc<ProducerStats>,
        callback: Option<BatchCallback>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..threads)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&rx),
                    engine: Arc::clone(&engine),
                    tracker: Arc::clone(&tracker),
                    stats: Arc::clone(&stats),
                    callback: callback.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            "Dispatch pool started with {} workers, queue capacity {}",
            threads, queue_capacity
        );

        Self {
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            tracker,
            stats,
        }
    }

    /// Enqueue a batch, waiting for queue capacity if necessary
    pub(crate) async fn submit_batch(&self, batch: Batch) -> Result<()> {
        let sender = self.queue.lock().clone().ok_or(Error::ProducerClosed)?;

        let records = batch.len();
        self.tracker.begin();
        if sender.send(batch).await.is_err() {
            self.tracker.cancel();
            return Err(Error::ProducerClosed);
        }

        self.stats.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        debug!("Dispatched batch of {} records", records);
        Ok(())
    }

    /// Close the queue and wait for the workers to drain it
    pub(crate) async fn shutdown(&self) {
        let sender = self.queue.lock().take();
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Dispatch worker terminated abnormally: {}", e);
            }
        }
        info!("Dispatch pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: SharedReceiver,
    engine: Arc<RetryEngine>,
    tracker: Arc<OutstandingWork>,
    stats: Arc<ProducerStats>,
    callback: Option<BatchCallback>,
}

impl Worker {
    async fn run(self) {
        loop {
            // Only the receive is serialized; the batch is processed unlocked
            let batch = self.queue.lock().await.recv().await;
            let Some(batch) = batch else {
                break;
            };

            let records = batch.len();
            let outcome = self.resolve(batch).await;

            let failed = outcome.permanently_failed.len();
            self.stats
                .records_delivered
                .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
            self.stats
                .records_failed
                .fetch_add(failed as u64, Ordering::Relaxed);

            let report = BatchReport {
                records,
                delivered: outcome.delivered,
                failed,
                attempts: outcome.attempts,
                completed_at: SystemTime::now(),
            };
            self.tracker.complete(outcome);

            if let Some(callback) = &self.callback {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(&report))).is_err() {
                    warn!("Batch callback panicked on dispatch worker {}", self.id);
                }
            }
        }
        debug!("Dispatch worker {} exiting", self.id);
    }

    /// Run the retry engine on its own task so a panicking transport fails
    /// the batch instead of the worker
    async fn resolve(&self, batch: Batch) -> RetryOutcome {
        let pending = batch.records().to_vec();
        let engine = Arc::clone(&self.engine);

        match tokio::spawn(async move { engine.run(batch).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Dispatch worker {} lost a batch of {} records: {}",
                    self.id,
                    pending.len(),
                    e
                );
                let reason = FailureReason::Transport(format!("dispatch task failed: {}", e));
                RetryOutcome {
                    delivered: 0,
                    permanently_failed: pending
                        .into_iter()
                        .map(|record| FailedRecord {
                            record,
                            reason: reason.clone(),
                            attempts: 1,
                        })
                        .collect(),
                    attempts: 1,
                }
            }
        }
    }
}
