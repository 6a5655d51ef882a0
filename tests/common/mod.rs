//! Common test utilities for engine tests
//!
//! Provides scripted backends for both dispatch modes:
//! - `FakeConnectionProvider` for the connection-owning engine
//! - `FakeChannelProvider` for the forwarding engine
//! - `spawn_tcp_backend` speaking the real frame protocol

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shardline::backend::codec::{read_frame, read_magic, write_frame, BackendReply, ForwardRequest, ReplyFrame};
use shardline::error::ExecResult;
use shardline::executor::{BackendConnection, ConnectionProvider, StatementOptions};
use shardline::forward::{BackendChannel, ChannelProvider};
use shardline::response::{ColumnMetadata, ColumnType, QueryMetadata, RawOutcome};
use shardline::{ExecutionError, ResponseRegistry};

/// Single-column `id` result whose metadata names `table` as its origin
pub fn rows_reply(table: &str, ids: &[i64]) -> BackendReply {
    BackendReply::rows(
        Some(QueryMetadata::new(vec![
            ColumnMetadata::new("id", ColumnType::Integer).with_table(table)
        ])),
        ids.iter().map(|id| vec![json!(id)]).collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub data_source: String,
    pub sql: String,
    pub capture_metadata: bool,
    pub return_generated_keys: bool,
}

/// Scripted backend shared by all fake connections
#[derive(Default)]
pub struct FakeBackend {
    replies: HashMap<String, BackendReply>,
    delays: HashMap<String, Duration>,
    unreachable: HashSet<String>,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub executions: Mutex<Vec<Execution>>,
    in_flight: Mutex<HashMap<String, usize>>,
    pub overlaps: AtomicUsize,
}

impl FakeBackend {
    pub fn executed(&self) -> Vec<Execution> {
        self.executions.lock().clone()
    }

    pub fn captures(&self) -> usize {
        self.executions
            .lock()
            .iter()
            .filter(|e| e.capture_metadata)
            .count()
    }

    pub fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    fn reply_for(&self, sql: &str) -> BackendReply {
        self.replies
            .get(sql)
            .cloned()
            .unwrap_or_else(|| BackendReply::ok(0, 0))
    }
}

pub struct FakeConnectionProvider {
    pub backend: Arc<FakeBackend>,
}

impl FakeConnectionProvider {
    pub fn builder() -> FakeBackendBuilder {
        FakeBackendBuilder::default()
    }
}

#[derive(Default)]
pub struct FakeBackendBuilder {
    backend: FakeBackend,
}

impl FakeBackendBuilder {
    pub fn reply(mut self, sql: &str, reply: BackendReply) -> Self {
        self.backend.replies.insert(sql.to_string(), reply);
        self
    }

    pub fn delay(mut self, sql: &str, millis: u64) -> Self {
        self.backend
            .delays
            .insert(sql.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn unreachable(mut self, data_source: &str) -> Self {
        self.backend.unreachable.insert(data_source.to_string());
        self
    }

    pub fn connections(self) -> Arc<FakeConnectionProvider> {
        Arc::new(FakeConnectionProvider {
            backend: Arc::new(self.backend),
        })
    }

    pub fn channels(self, registry: Arc<ResponseRegistry<ReplyFrame>>) -> Arc<FakeChannelProvider> {
        Arc::new(FakeChannelProvider {
            backend: Arc::new(self.backend),
            registry,
        })
    }
}

struct FakeConnection {
    data_source: String,
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl BackendConnection for FakeConnection {
    async fn execute(&mut self, sql: &str, options: StatementOptions) -> ExecResult<RawOutcome> {
        {
            let mut in_flight = self.backend.in_flight.lock();
            let count = in_flight.entry(self.data_source.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.backend.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.backend.executions.lock().push(Execution {
            data_source: self.data_source.clone(),
            sql: sql.to_string(),
            capture_metadata: options.capture_metadata,
            return_generated_keys: options.return_generated_keys,
        });

        if let Some(delay) = self.backend.delays.get(sql) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(count) = self.backend.in_flight.lock().get_mut(&self.data_source) {
            *count -= 1;
        }
        Ok(self.backend.reply_for(sql).into_outcome())
    }
}

#[async_trait]
impl ConnectionProvider for FakeConnectionProvider {
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendConnection>> {
        if self.backend.unreachable.contains(data_source) {
            return Err(ExecutionError::Resource(format!(
                "cannot connect to data source '{}'",
                data_source
            )));
        }
        self.backend.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            data_source: data_source.to_string(),
            backend: self.backend.clone(),
        }))
    }

    fn release(&self, _data_source: &str, _connection: Box<dyn BackendConnection>) {
        self.backend.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Channel whose replies are delivered into the registry by a spawned task,
/// after the scripted delay. Data sources scripted as silent never reply.
pub struct FakeChannelProvider {
    pub backend: Arc<FakeBackend>,
    registry: Arc<ResponseRegistry<ReplyFrame>>,
}

struct FakeChannel {
    data_source: String,
    backend: Arc<FakeBackend>,
    registry: Arc<ResponseRegistry<ReplyFrame>>,
}

pub const SILENT: &str = "-- silent";

#[async_trait]
impl BackendChannel for FakeChannel {
    async fn send(&mut self, request: ForwardRequest) -> ExecResult<()> {
        self.backend.executions.lock().push(Execution {
            data_source: self.data_source.clone(),
            sql: request.sql.clone(),
            capture_metadata: request.capture_metadata,
            return_generated_keys: request.return_generated_keys,
        });
        if request.sql.ends_with(SILENT) {
            return Ok(());
        }

        let reply = self.backend.reply_for(&request.sql);
        let delay = self.backend.delays.get(&request.sql).copied();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            registry.offer(
                request.correlation_id,
                ReplyFrame {
                    correlation_id: request.correlation_id,
                    unit_index: request.unit_index,
                    reply,
                },
            );
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

#[async_trait]
impl ChannelProvider for FakeChannelProvider {
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendChannel>> {
        if self.backend.unreachable.contains(data_source) {
            return Err(ExecutionError::Resource(format!(
                "no channel to data source '{}'",
                data_source
            )));
        }
        self.backend.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            data_source: data_source.to_string(),
            backend: self.backend.clone(),
            registry: self.registry.clone(),
        }))
    }

    fn release(&self, _data_source: &str, _channel: Box<dyn BackendChannel>) {
        self.backend.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend listening on an ephemeral port, answering every request from
/// `replies` keyed by SQL (default: an OK with 0 rows). Metadata is only
/// sent when the request asked for it.
pub async fn spawn_tcp_backend(replies: HashMap<String, BackendReply>) -> SocketAddr {
    spawn_slow_tcp_backend(replies, HashMap::new()).await
}

/// Like [`spawn_tcp_backend`], sleeping before answering the SQL in `delays`
pub async fn spawn_slow_tcp_backend(
    replies: HashMap<String, BackendReply>,
    delays: HashMap<String, Duration>,
) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let replies = Arc::new(replies);
    let delays = Arc::new(delays);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let replies = replies.clone();
            let delays = delays.clone();
            tokio::spawn(async move {
                if read_magic(&mut stream).await.is_err() {
                    return;
                }
                while let Ok(Some(request)) = read_frame::<_, ForwardRequest>(&mut stream).await {
                    if let Some(delay) = delays.get(&request.sql) {
                        tokio::time::sleep(*delay).await;
                    }
                    let mut reply = replies
                        .get(&request.sql)
                        .cloned()
                        .unwrap_or_else(|| BackendReply::ok(0, 0));
                    if let BackendReply::Rows { metadata, .. } = &mut reply {
                        if !request.capture_metadata {
                            *metadata = None;
                        }
                    }
                    let frame = ReplyFrame {
                        correlation_id: request.correlation_id,
                        unit_index: request.unit_index,
                        reply,
                    };
                    if write_frame(&mut stream, &frame).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    addr
}
