//! Producer configuration
//!
//! [`ProducerConfig`] can be built in code through [`ProducerConfig::builder`]
//! or deserialized from any serde format; missing fields fall back to the
//! defaults below.
//!
//! ```rust,ignore
//! use rivven_ingest::ProducerConfig;
//!
//! let config = ProducerConfig::builder()
//!     .stream_name("clickstream")
//!     .batch_size(250)
//!     .max_retries(3)
//!     .threads(4)
//!     .build();
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Records accepted by the service in a single bulk call
pub const MAX_BATCH_RECORDS: usize = 500;
/// Default records per batch
const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_RECORDS;
/// Default retry ceiling
const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default worker count
const DEFAULT_THREADS: usize = 10;
/// Default backoff base
const DEFAULT_BASE_BACKOFF_MS: u64 = 100;
/// Service limit for a single record payload (1 MiB)
const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;
/// Service limit for a whole bulk request (5 MiB)
const DEFAULT_MAX_BATCH_BYTES: usize = 5 * 1024 * 1024;
/// Default linger before a partial batch is dispatched
const DEFAULT_LINGER_MS: u64 = 5000;

// ============================================================================
// Configuration
// ============================================================================

/// Producer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Target stream (required)
    pub stream_name: String,
    /// Records per batch before dispatch
    pub batch_size: usize,
    /// Retry cycles after the initial submit
    pub max_retries: u32,
    /// Number of dispatch workers
    pub threads: usize,
    /// Backoff base; attempt `k` sleeps `base * 2^k`
    pub base_backoff_ms: u64,
    /// Per-record payload ceiling in bytes
    pub max_record_bytes: usize,
    /// Per-batch ceiling in bytes (payloads + partition keys)
    pub max_batch_bytes: usize,
    /// Dispatch a partial batch after this long without a dispatch (0 disables)
    pub linger_ms: u64,
    /// Bounded dispatch queue capacity (None = `threads * 2`)
    pub queue_capacity: Option<usize>,
    /// Service endpoint (host:port) used by [`crate::TcpTransport`]
    pub endpoint: String,
    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            threads: DEFAULT_THREADS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            linger_ms: DEFAULT_LINGER_MS,
            queue_capacity: None,
            endpoint: "localhost:9092".to_string(),
            connection_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ProducerConfig {
    /// Create a new builder
    pub fn builder() -> ProducerConfigBuilder {
        ProducerConfigBuilder::default()
    }

    /// Low-latency configuration: small batches, short linger
    pub fn low_latency(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            batch_size: 50,
            linger_ms: 100,
            base_backoff_ms: 50,
            ..Default::default()
        }
    }

    /// High-throughput configuration: full batches, more workers
    pub fn high_throughput(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            batch_size: MAX_BATCH_RECORDS,
            threads: 32,
            linger_ms: 1000,
            ..Default::default()
        }
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn linger(&self) -> Option<Duration> {
        (self.linger_ms > 0).then(|| Duration::from_millis(self.linger_ms))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Effective dispatch queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.threads * 2).max(1)
    }

    /// Check the configuration against the service limits
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.is_empty() {
            return Err(Error::Config("stream_name is required".to_string()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_RECORDS {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_RECORDS, self.batch_size
            )));
        }
        if self.threads == 0 {
            return Err(Error::Config("threads must be at least 1".to_string()));
        }
        if self.max_record_bytes == 0 {
            return Err(Error::Config(
                "max_record_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_batch_bytes < self.max_record_bytes {
            return Err(Error::Config(format!(
                "max_batch_bytes ({}) must be at least max_record_bytes ({})",
                self.max_batch_bytes, self.max_record_bytes
            )));
        }
        Ok(())
    }
}

/// Builder for ProducerConfig
#[derive(Default)]
pub struct ProducerConfigBuilder {
    config: ProducerConfig,
}

impl ProducerConfigBuilder {
    /// Set the target stream
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream_name = name.into();
        self
    }

    /// Set records per batch
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the retry ceiling
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the number of dispatch workers
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set the backoff base
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.config.base_backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the per-record byte ceiling
    pub fn max_record_bytes(mut self, bytes: usize) -> Self {
        self.config.max_record_bytes = bytes;
        self
    }

    /// Set the per-batch byte ceiling
    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.config.max_batch_bytes = bytes;
        self
    }

    /// Set linger in milliseconds (0 disables)
    pub fn linger_ms(mut self, ms: u64) -> Self {
        self.config.linger_ms = ms;
        self
    }

    /// Set the dispatch queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    /// Set the service endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ProducerConfig {
        self.config
    }
}
