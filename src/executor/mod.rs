//! Connection-owning dispatch

pub mod connection;
pub mod engine;
pub mod pool;
pub mod strategy;

pub use connection::{BackendConnection, ConnectionGuard, ConnectionProvider, StatementOptions};
pub use engine::ExecuteEngine;
pub use pool::WorkerPool;
pub use strategy::{
    strategy_for, ConnectionMode, ConnectionStrictlyStrategy, ExecutionStrategy, MemoryStrictlyStrategy,
};
