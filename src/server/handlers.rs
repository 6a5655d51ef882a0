use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{ReplyFrame, TcpChannelProvider, TcpConnectionProvider};
use crate::collector::ResponseRegistry;
use crate::config::{DispatchMode, EngineConfig};
use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::executor::{strategy_for, ExecuteEngine, WorkerPool};
use crate::forward::ForwardEngine;
use crate::handler::{BackendHandler, Dispatch};
use crate::response::ColumnMetadata;
use crate::route::{RouteResult, RouteUnit, SqlStatement};
use crate::transaction::{SessionTransaction, TransactionType};

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<BackendHandler>,
    pub context: ExecutionContext,
    /// Present in forwarding mode
    pub registry: Option<Arc<ResponseRegistry<ReplyFrame>>>,
    pub data_sources: Vec<String>,
    /// Applied to requests whose transaction names no type
    pub transaction_type: TransactionType,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(handler: Arc<BackendHandler>, context: ExecutionContext) -> Self {
        Self {
            handler,
            context,
            registry: None,
            data_sources: Vec::new(),
            transaction_type: TransactionType::default(),
            startup_time: Instant::now(),
        }
    }

    pub fn with_transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ResponseRegistry<ReplyFrame>>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_data_sources(mut self, data_sources: Vec<String>) -> Self {
        self.data_sources = data_sources;
        self
    }

    /// Wire the TCP backends and the configured engine
    pub fn from_config(config: &EngineConfig) -> Self {
        let context = ExecutionContext::new(config.transaction_type);
        let data_sources: Vec<String> = config.data_sources.keys().cloned().collect();

        let mut registry = None;
        let dispatcher: Arc<dyn Dispatch> = match config.mode {
            DispatchMode::Connection => {
                let provider = Arc::new(TcpConnectionProvider::new(
                    config.data_sources.clone(),
                    config.connect_timeout(),
                ));
                let strategy = strategy_for(config.connection_mode, config.fetch_size);
                Arc::new(
                    ExecuteEngine::new(provider, Arc::from(strategy), WorkerPool::new(config.executor_size))
                        .with_show_sql(config.show_sql),
                )
            }
            DispatchMode::Forward => {
                let replies = Arc::new(ResponseRegistry::new());
                let channels = Arc::new(TcpChannelProvider::new(
                    config.data_sources.clone(),
                    config.connect_timeout(),
                    replies.clone(),
                ));
                registry = Some(replies.clone());
                Arc::new(
                    ForwardEngine::new(channels, replies, config.backend_timeout())
                        .with_fetch_size(Some(config.fetch_size))
                        .with_show_sql(config.show_sql),
                )
            }
        };

        Self {
            handler: Arc::new(BackendHandler::new(dispatcher)),
            context,
            registry,
            data_sources,
            transaction_type: config.transaction_type,
            startup_time: Instant::now(),
        }
    }
}

// ==================== Request/Response Types ====================

/// A statement the router already split into physical units.
///
/// The HTTP surface keeps no sessions: a caller inside a transaction sends
/// its state with every statement.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub statement: SqlStatement,
    #[serde(default)]
    pub units: Vec<RouteUnit>,
    #[serde(default)]
    pub transaction: Option<RequestTransaction>,
}

/// Transaction state of the calling session
#[derive(Debug, Deserialize)]
pub struct RequestTransaction {
    #[serde(rename = "type", default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub active: bool,
}

impl RequestTransaction {
    fn session(&self, default_type: TransactionType) -> SessionTransaction {
        let session = SessionTransaction::new(self.transaction_type.unwrap_or(default_type));
        if self.active {
            session.begin();
        }
        session
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponseBody {
    Query {
        columns: Vec<ColumnMetadata>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        affected_rows: u64,
        last_insert_id: u64,
    },
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub data_sources: Vec<String>,
    pub uptime_secs: u64,
}

// ==================== Handlers ====================

pub async fn execute_statement(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponseBody>, ExecutionError> {
    let context = match &req.transaction {
        Some(transaction) => state
            .context
            .clone()
            .with_transaction(Arc::new(transaction.session(state.transaction_type))),
        None => state.context.clone(),
    };
    let route = RouteResult::with_units(req.statement, req.units);
    let mut result = state.handler.execute(&route, &context).await?;

    let columns = result.metadata().map(|m| m.columns.clone());
    let body = match columns {
        Some(columns) => {
            let rows = result.drain_rows()?;
            ExecuteResponseBody::Query { columns, rows }
        }
        None => ExecuteResponseBody::Update {
            affected_rows: result.affected_rows().unwrap_or(0),
            last_insert_id: result.last_insert_id().unwrap_or(0),
        },
    };
    Ok(Json(body))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        mode: state.handler.mode().to_string(),
        data_sources: state.data_sources.clone(),
        uptime_secs: state.startup_time.elapsed().as_secs(),
    })
}
