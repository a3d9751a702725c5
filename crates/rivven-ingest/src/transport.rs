//! Bulk-submit transport
//!
//! [`BatchTransport`] is the seam between the producer and the network. The
//! producer only ever calls [`BatchTransport::put_records`]; an `Err` means
//! the call itself failed (connection, timeout, malformed response), while
//! per-record rejections come back inside the `Ok` status list.

use crate::protocol::{RecordStatus, Request, Response, WireRecord};
use crate::record::Record;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

// Default maximum response size (100 MB) - prevents a misbehaving server from exhausting client memory
const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// One bulk RPC against the stream service
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Submit `records` to `stream`, returning one status per record in order
    async fn put_records(&self, stream: &str, records: &[Record]) -> Result<Vec<RecordStatus>>;
}

// ============================================================================
// TCP Transport
// ============================================================================

/// Length-prefixed bincode transport over pooled TCP connections
///
/// Each call checks out an idle connection (or dials a new one), so concurrent
/// dispatch workers never queue behind each other. A connection that sees any
/// error is dropped instead of being returned to the pool.
pub struct TcpTransport {
    addr: String,
    idle: Mutex<Vec<TcpStream>>,
    max_idle: usize,
    connection_timeout: Duration,
    request_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport without dialing
    pub fn new(
        addr: impl Into<String>,
        max_idle: usize,
        connection_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            addr: addr.into(),
            idle: Mutex::new(Vec::new()),
            max_idle,
            connection_timeout,
            request_timeout,
        }
    }

    /// Create a transport and verify the endpoint answers a ping
    pub async fn connect(
        addr: impl Into<String>,
        max_idle: usize,
        connection_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let transport = Self::new(addr, max_idle, connection_timeout, request_timeout);
        transport.ping().await?;
        Ok(transport)
    }

    /// Round-trip a ping
    pub async fn ping(&self) -> Result<()> {
        match self.request(&Request::Ping).await? {
            Response::Pong => Ok(()),
            Response::Error { message } => Err(Error::Server(message)),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Send one request and wait for its response
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let mut stream = self.checkout().await?;

        let result = tokio::time::timeout(self.request_timeout, send_request(&mut stream, request))
            .await
            .map_err(|_| Error::Timeout)
            .and_then(|r| r);

        match &result {
            Ok(_) => self.checkin(stream),
            Err(e) => debug!("Dropping connection to {} after error: {}", self.addr, e),
        }
        result
    }

    async fn open(&self) -> Result<TcpStream> {
        info!("Connecting to stream service at {}", self.addr);
        let stream = tokio::time::timeout(self.connection_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| Error::Connection(format!("Connection timeout to {}", self.addr)))?
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", self.addr, e)))?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    async fn checkout(&self) -> Result<TcpStream> {
        let idle = self.idle.lock().pop();
        match idle {
            Some(stream) => Ok(stream),
            None => self.open().await,
        }
    }

    fn checkin(&self, stream: TcpStream) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(stream);
        }
    }
}

#[async_trait]
impl BatchTransport for TcpTransport {
    async fn put_records(&self, stream: &str, records: &[Record]) -> Result<Vec<RecordStatus>> {
        let request = Request::PutRecords {
            stream: stream.to_string(),
            records: records.iter().map(WireRecord::from).collect(),
        };

        put_records_statuses(self.request(&request).await?)
    }
}

/// Unpack a put-records response, rejecting one whose failure count
/// disagrees with its statuses
fn put_records_statuses(response: Response) -> Result<Vec<RecordStatus>> {
    match response {
        Response::PutRecordsResult {
            failed_record_count,
            records,
        } => {
            let failed = records.iter().filter(|s| !s.is_ok()).count();
            if failed != failed_record_count as usize {
                debug!(
                    "Response reports {} failed records but carries {}",
                    failed_record_count, failed
                );
                return Err(Error::InvalidResponse);
            }
            Ok(records)
        }
        Response::Error { message } => Err(Error::Server(message)),
        _ => Err(Error::InvalidResponse),
    }
}

/// Write a framed request and read the framed response
async fn send_request<S>(stream: &mut S, request: &Request) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request_bytes = request.to_bytes()?;

    let len = request_bytes.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&request_bytes).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let msg_len = u32::from_be_bytes(len_buf) as usize;

    if msg_len > MAX_RESPONSE_SIZE {
        return Err(Error::ResponseTooLarge(msg_len, MAX_RESPONSE_SIZE));
    }

    let mut response_buf = vec![0u8; msg_len];
    stream.read_exact(&mut response_buf).await?;

    Response::from_bytes(&response_buf)
}
