pub mod backend;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod forward;
pub mod handler;
pub mod merge;
pub mod metadata;
pub mod metrics;
pub mod response;
pub mod result;
pub mod route;
pub mod server;
pub mod transaction;

pub use collector::{CorrelationId, PendingWait, ResponseRegistry};
pub use config::{DispatchMode, EngineConfig};
pub use context::ExecutionContext;
pub use error::{DriverCause, ErrorKind, ExecResult, ExecutionError};
pub use executor::{ConnectionMode, ExecuteEngine, WorkerPool};
pub use forward::ForwardEngine;
pub use handler::{BackendHandler, Dispatch};
pub use merge::{MergeEngine, MergeStrategy, MergedUpdateResult};
pub use response::{ColumnMetadata, ColumnType, ExecuteResponse, QueryMetadata, RawOutcome, UpdateOutcome};
pub use result::LogicalResult;
pub use route::{RouteResult, RouteUnit, SqlStatement, StatementKind};
pub use server::create_router;
pub use transaction::{SessionTransaction, TransactionStatus, TransactionType};
