//! TCP transports to backend data sources
//!
//! [`TcpConnectionProvider`] hands out request/reply connections for the
//! connection-owning engine. [`TcpChannelProvider`] hands out channels whose
//! reader task delivers every reply into the shared response registry.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::codec::{read_frame, write_frame, write_magic, CodecError, ForwardRequest, ReplyFrame};
use crate::collector::{CorrelationId, ResponseRegistry};
use crate::error::{DriverCause, ExecResult, ExecutionError};
use crate::executor::{BackendConnection, ConnectionProvider, StatementOptions};
use crate::forward::{BackendChannel, ChannelProvider};
use crate::response::RawOutcome;

async fn connect(data_source: &str, addr: &str, timeout: Duration) -> ExecResult<TcpStream> {
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ExecutionError::Resource(format!(
                "cannot connect to data source '{}' at {}: {}",
                data_source, addr, e
            )))
        }
        Err(_) => {
            return Err(ExecutionError::Resource(format!(
                "connecting to data source '{}' at {} timed out after {:?}",
                data_source, addr, timeout
            )))
        }
    };
    let _ = stream.set_nodelay(true);
    write_magic(&mut stream).await.map_err(|e| {
        ExecutionError::Resource(format!("handshake with data source '{}' failed: {}", data_source, e))
    })?;
    tracing::debug!("Connected to data source {} at {}", data_source, addr);
    Ok(stream)
}

fn lost(data_source: &str, e: CodecError) -> ExecutionError {
    ExecutionError::driver(data_source, DriverCause::new(format!("backend connection lost: {}", e)))
}

/// Idle connections per data source, plus the address book
struct IdlePool<T: ?Sized> {
    addresses: BTreeMap<String, String>,
    connect_timeout: Duration,
    idle: Mutex<HashMap<String, Vec<Box<T>>>>,
}

impl<T: ?Sized> IdlePool<T> {
    fn new(addresses: BTreeMap<String, String>, connect_timeout: Duration) -> Self {
        Self {
            addresses,
            connect_timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    fn address(&self, data_source: &str) -> ExecResult<&str> {
        self.addresses
            .get(data_source)
            .map(String::as_str)
            .ok_or_else(|| ExecutionError::Resource(format!("unknown data source '{}'", data_source)))
    }

    fn take(&self, data_source: &str) -> Option<Box<T>> {
        self.idle.lock().get_mut(data_source).and_then(|conns| conns.pop())
    }

    fn put(&self, data_source: &str, item: Box<T>) {
        self.idle
            .lock()
            .entry(data_source.to_string())
            .or_default()
            .push(item);
    }

    fn idle_count(&self, data_source: &str) -> usize {
        self.idle.lock().get(data_source).map(Vec::len).unwrap_or(0)
    }
}

/// Request/reply connection: one statement in flight at a time
pub struct TcpConnection {
    data_source: String,
    stream: TcpStream,
    next_id: u64,
    broken: bool,
    /// Set from the write until the matching reply is read. Still set when
    /// the call was cancelled, since the reply may be queued on the socket.
    awaiting_reply: bool,
}

#[async_trait]
impl BackendConnection for TcpConnection {
    async fn execute(&mut self, sql: &str, options: StatementOptions) -> ExecResult<RawOutcome> {
        self.next_id += 1;
        let id = CorrelationId(self.next_id);
        let request = ForwardRequest {
            correlation_id: id,
            unit_index: 0,
            sql: sql.to_string(),
            return_generated_keys: options.return_generated_keys,
            capture_metadata: options.capture_metadata,
            fetch_size: options.fetch_size,
        };

        self.awaiting_reply = true;
        if let Err(e) = write_frame(&mut self.stream, &request).await {
            self.broken = true;
            return Err(lost(&self.data_source, e));
        }

        let frame: ReplyFrame = match read_frame(&mut self.stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.broken = true;
                return Err(ExecutionError::driver(
                    &self.data_source,
                    DriverCause::new("backend closed the connection"),
                ));
            }
            Err(e) => {
                self.broken = true;
                return Err(lost(&self.data_source, e));
            }
        };

        if frame.correlation_id != id {
            self.broken = true;
            return Err(ExecutionError::InvalidState(format!(
                "data source '{}' answered request {} with reply {}",
                self.data_source, id, frame.correlation_id
            )));
        }
        self.awaiting_reply = false;
        Ok(frame.reply.into_outcome())
    }

    fn is_reusable(&self) -> bool {
        !self.broken && !self.awaiting_reply
    }
}

pub struct TcpConnectionProvider {
    pool: IdlePool<dyn BackendConnection>,
}

impl TcpConnectionProvider {
    pub fn new(addresses: BTreeMap<String, String>, connect_timeout: Duration) -> Self {
        Self {
            pool: IdlePool::new(addresses, connect_timeout),
        }
    }

    pub fn idle_count(&self, data_source: &str) -> usize {
        self.pool.idle_count(data_source)
    }
}

#[async_trait]
impl ConnectionProvider for TcpConnectionProvider {
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendConnection>> {
        let addr = self.pool.address(data_source)?;
        if let Some(connection) = self.pool.take(data_source) {
            return Ok(connection);
        }
        let stream = connect(data_source, addr, self.pool.connect_timeout).await?;
        Ok(Box::new(TcpConnection {
            data_source: data_source.to_string(),
            stream,
            next_id: 0,
            broken: false,
            awaiting_reply: false,
        }))
    }

    fn release(&self, data_source: &str, connection: Box<dyn BackendConnection>) {
        if connection.is_reusable() {
            self.pool.put(data_source, connection);
        } else {
            tracing::debug!("Dropping broken connection to {}", data_source);
        }
    }
}

/// Write side of a forwarding channel; the read side runs as a task
pub struct TcpChannel {
    data_source: String,
    writer: OwnedWriteHalf,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl TcpChannel {
    fn start(data_source: &str, stream: TcpStream, registry: Arc<ResponseRegistry<ReplyFrame>>) -> Self {
        let (mut read_half, writer) = stream.into_split();
        let open = Arc::new(AtomicBool::new(true));
        let reader_open = open.clone();
        let name = data_source.to_string();

        let reader = tokio::spawn(async move {
            loop {
                match read_frame::<_, ReplyFrame>(&mut read_half).await {
                    Ok(Some(frame)) => {
                        registry.offer(frame.correlation_id, frame);
                    }
                    Ok(None) => {
                        tracing::debug!("Channel to {} closed by backend", name);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Channel to {} failed: {}", name, e);
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::Release);
        });

        Self {
            data_source: data_source.to_string(),
            writer,
            open,
            reader,
        }
    }
}

#[async_trait]
impl BackendChannel for TcpChannel {
    async fn send(&mut self, request: ForwardRequest) -> ExecResult<()> {
        if !self.is_open() {
            return Err(ExecutionError::driver(
                &self.data_source,
                DriverCause::new("backend channel is closed"),
            ));
        }
        write_frame(&mut self.writer, &request).await.map_err(|e| {
            self.open.store(false, Ordering::Release);
            lost(&self.data_source, e)
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct TcpChannelProvider {
    pool: IdlePool<dyn BackendChannel>,
    registry: Arc<ResponseRegistry<ReplyFrame>>,
}

impl TcpChannelProvider {
    pub fn new(
        addresses: BTreeMap<String, String>,
        connect_timeout: Duration,
        registry: Arc<ResponseRegistry<ReplyFrame>>,
    ) -> Self {
        Self {
            pool: IdlePool::new(addresses, connect_timeout),
            registry,
        }
    }

    pub fn idle_count(&self, data_source: &str) -> usize {
        self.pool.idle_count(data_source)
    }
}

#[async_trait]
impl ChannelProvider for TcpChannelProvider {
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendChannel>> {
        let addr = self.pool.address(data_source)?;
        while let Some(channel) = self.pool.take(data_source) {
            if channel.is_open() {
                return Ok(channel);
            }
        }
        let stream = connect(data_source, addr, self.pool.connect_timeout).await?;
        Ok(Box::new(TcpChannel::start(data_source, stream, self.registry.clone())))
    }

    fn release(&self, data_source: &str, channel: Box<dyn BackendChannel>) {
        if channel.is_open() {
            self.pool.put(data_source, channel);
        }
    }
}
