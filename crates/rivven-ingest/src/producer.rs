//! Batching producer with background dispatch and partial-failure repair
//!
//! [`Producer`] is the public entry point. Records passed to
//! [`Producer::put`] are encoded and buffered; every `batch_size` records the
//! buffer is handed to a fixed pool of workers that submit it in one bulk
//! call and retry only the records the service rejected.
//!
//! # Features
//!
//! - **Arc-based concurrency**: `Producer` is `Clone`; share it across tasks
//! - **Non-blocking puts**: `put` never waits on the network, only on the
//!   buffer lock and, under backpressure, on dispatch queue capacity
//! - **Partial retries**: exponential backoff applied to the failed subset
//! - **Linger**: partial batches are dispatched after `linger_ms` idle
//! - **Failure reports**: permanently failed records are returned by
//!   [`Producer::flush`] and [`Producer::close`]
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_ingest::{Producer, ProducerConfig};
//!
//! # async fn example() -> rivven_ingest::Result<()> {
//! let config = ProducerConfig::builder()
//!     .stream_name("clickstream")
//!     .endpoint("localhost:9092")
//!     .build();
//!
//! let producer = Producer::connect(config).await?;
//!
//! for i in 0..1000 {
//!     let producer = producer.clone();
//!     tokio::spawn(async move {
//!         producer.put(format!("click-{}", i), Some("user-42")).await
//!     });
//! }
//!
//! let report = producer.close().await?;
//! for failed in report {
//!     eprintln!("lost record: {}", failed.reason);
//! }
//! # Ok(())
//! # }
//! ```

use crate::buffer::RecordBuffer;
use crate::config::ProducerConfig;
use crate::pool::{BatchCallback, DispatchPool};
use crate::record::{Batch, RecordEncoder, RecordValue};
use crate::retry::RetryEngine;
use crate::stats::{ProducerStats, ProducerStatsSnapshot};
use crate::submitter::BatchSubmitter;
use crate::tracker::{FailureReport, OutstandingWork};
use crate::transport::{BatchTransport, TcpTransport};
use crate::{Error, Result};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Batching, retrying producer for a single stream
///
/// Uses `Arc` internally; clones share the same buffer and workers.
#[derive(Clone)]
pub struct Producer {
    inner: Arc<ProducerInner>,
}

struct ProducerInner {
    config: ProducerConfig,
    encoder: RecordEncoder,
    buffer: RecordBuffer,
    pool: DispatchPool,
    tracker: Arc<OutstandingWork>,
    stats: Arc<ProducerStats>,
    /// Set once `close` begins. Puts hold the read side for their whole
    /// append-and-dispatch, so taking the write side waits them out.
    closed: RwLock<bool>,
    /// Serializes drain-and-dispatch between flush and the linger task
    drain_lock: tokio::sync::Mutex<()>,
    last_dispatch: parking_lot::Mutex<Instant>,
    shutdown_tx: watch::Sender<bool>,
    /// Flips to true once the first `close` has fully finished
    close_done: watch::Sender<bool>,
    linger_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Producer {
    /// Create a producer over an existing transport.
    ///
    /// Spawns the dispatch workers, so it must be called within a tokio runtime.
    pub fn new(config: ProducerConfig, transport: Arc<dyn BatchTransport>) -> Result<Self> {
        Self::build(config, transport, None)
    }

    /// Like [`Producer::new`], invoking `callback` after every resolved batch
    pub fn with_batch_callback(
        config: ProducerConfig,
        transport: Arc<dyn BatchTransport>,
        callback: BatchCallback,
    ) -> Result<Self> {
        Self::build(config, transport, Some(callback))
    }

    /// Connect a [`TcpTransport`] to `config.endpoint` and create a producer
    pub async fn connect(config: ProducerConfig) -> Result<Self> {
        config.validate()?;
        let transport = TcpTransport::connect(
            config.endpoint.clone(),
            config.threads,
            config.connection_timeout(),
            config.request_timeout(),
        )
        .await?;
        Self::new(config, Arc::new(transport))
    }

    fn build(
        config: ProducerConfig,
        transport: Arc<dyn BatchTransport>,
        callback: Option<BatchCallback>,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(ProducerStats::default());
        let tracker = Arc::new(OutstandingWork::new());
        let engine = Arc::new(RetryEngine::new(
            BatchSubmitter::new(transport, config.stream_name.clone(), stats.clone()),
            config.max_retries,
            config.base_backoff(),
            stats.clone(),
        ));
        let pool = DispatchPool::new(
            config.threads,
            config.queue_capacity(),
            engine,
            tracker.clone(),
            stats.clone(),
            callback,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ProducerInner {
            encoder: RecordEncoder::new(config.max_record_bytes),
            buffer: RecordBuffer::new(
                config.batch_size,
                config.max_record_bytes,
                config.max_batch_bytes,
            ),
            pool,
            tracker,
            stats,
            closed: RwLock::new(false),
            drain_lock: tokio::sync::Mutex::new(()),
            last_dispatch: parking_lot::Mutex::new(Instant::now()),
            shutdown_tx,
            close_done: watch::channel(false).0,
            linger_handle: parking_lot::Mutex::new(None),
            config,
        });

        if let Some(linger) = inner.config.linger() {
            // Weak: the linger task never keeps the producer alive
            let weak = Arc::downgrade(&inner);
            let handle = tokio::spawn(linger_task(weak, linger, shutdown_rx));
            *inner.linger_handle.lock() = Some(handle);
        }

        info!(
            "Producer initialized for stream '{}' (batch size {}, {} workers, {} retries)",
            inner.config.stream_name,
            inner.config.batch_size,
            inner.config.threads,
            inner.config.max_retries
        );

        Ok(Self { inner })
    }

    /// Buffer a record for `partition_key` (a random key when `None`)
    ///
    /// Fails synchronously with [`Error::RecordTooLarge`],
    /// [`Error::InvalidPartitionKey`] or [`Error::ProducerClosed`]. Delivery
    /// failures surface later, in the report returned by `flush`/`close`.
    pub async fn put<V: RecordValue>(&self, value: V, partition_key: Option<&str>) -> Result<()> {
        let closed = self.inner.closed.read().await;
        if *closed {
            return Err(Error::ProducerClosed);
        }

        let record = self.inner.encoder.encode(value, partition_key)?;
        let detached = self.inner.buffer.append(record)?;
        self.inner
            .stats
            .records_accepted
            .fetch_add(1, Ordering::Relaxed);

        if let Some(batch) = detached {
            self.inner.dispatch(batch).await?;
        }
        Ok(())
    }

    /// Buffer several records under the same partition key
    pub async fn put_records<I, V>(&self, values: I, partition_key: Option<&str>) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: RecordValue,
    {
        for value in values {
            self.put(value, partition_key).await?;
        }
        Ok(())
    }

    /// Dispatch the partial batch and wait until every dispatched batch has
    /// resolved. Returns the records that failed permanently since the last
    /// flush.
    pub async fn flush(&self) -> Result<FailureReport> {
        self.inner.dispatch_pending().await?;
        self.inner.tracker.wait_idle().await;

        let report = self.inner.take_report();
        debug!("Flush complete, {} permanent failures", report.len());
        Ok(report)
    }

    /// Flush, stop accepting records and stop the workers
    ///
    /// In-flight retries run to completion. A `close` that finds the producer
    /// already closing waits for the first one to finish and returns an empty
    /// report.
    pub async fn close(&self) -> Result<FailureReport> {
        {
            let mut closed = self.inner.closed.write().await;
            if *closed {
                drop(closed);
                let mut done = self.inner.close_done.subscribe();
                // Err only if the sender is gone, which can't outlive `inner`
                let _ = done.wait_for(|done| *done).await;
                return Ok(FailureReport::default());
            }
            *closed = true;
        }
        info!("Closing producer for stream '{}'", self.inner.config.stream_name);

        let result = self.shutdown().await;
        self.inner.close_done.send_replace(true);
        result
    }

    async fn shutdown(&self) -> Result<FailureReport> {
        let report = self.flush().await?;

        let _ = self.inner.shutdown_tx.send(true);
        let linger = self.inner.linger_handle.lock().take();
        if let Some(handle) = linger {
            if let Err(e) = handle.await {
                warn!("Linger task terminated abnormally: {}", e);
            }
        }
        self.inner.pool.shutdown().await;

        info!("Producer closed");
        Ok(report)
    }

    /// Whether `close` has begun
    pub async fn is_closed(&self) -> bool {
        *self.inner.closed.read().await
    }

    /// Records currently buffered and not yet dispatched
    pub fn buffered(&self) -> usize {
        self.inner.buffer.len()
    }

    /// Batches dispatched but not yet resolved
    pub fn in_flight(&self) -> u64 {
        self.inner.tracker.in_flight()
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.inner.config
    }

    /// Get producer statistics
    pub fn stats(&self) -> ProducerStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl ProducerInner {
    async fn dispatch(&self, batch: Batch) -> Result<()> {
        *self.last_dispatch.lock() = Instant::now();
        self.pool.submit_batch(batch).await
    }

    /// Detach and dispatch whatever is buffered
    async fn dispatch_pending(&self) -> Result<()> {
        let _guard = self.drain_lock.lock().await;
        match self.buffer.drain() {
            Some(batch) => self.dispatch(batch).await,
            None => Ok(()),
        }
    }

    fn take_report(&self) -> FailureReport {
        let report = self.tracker.take_failures();
        if !report.is_empty() {
            warn!(
                "{} records failed permanently on stream '{}'",
                report.len(),
                self.config.stream_name
            );
        }
        report
    }
}

/// Dispatch a partial batch when nothing was dispatched for `linger`
async fn linger_task(
    weak: Weak<ProducerInner>,
    linger: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(linger) => {}
        }

        let Some(inner) = weak.upgrade() else {
            break;
        };

        let closed = inner.closed.read().await;
        if *closed {
            break;
        }
        if inner.last_dispatch.lock().elapsed() < linger || inner.buffer.is_empty() {
            continue;
        }

        debug!("Linger expired, dispatching {} buffered records", inner.buffer.len());
        if let Err(e) = inner.dispatch_pending().await {
            warn!("Linger dispatch failed: {}", e);
        }
    }
    debug!("Linger task exiting");
}
