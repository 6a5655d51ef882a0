//! Connection usage strategies
//!
//! `ConnectionStrictly` buffers every query result in memory so one
//! connection can serve all units of a data source in turn.
//! `MemoryStrictly` hands the backend cursor through and streams with a
//! fetch size instead.

use serde::{Deserialize, Serialize};

use super::connection::StatementOptions;
use crate::error::ExecResult;
use crate::merge::{MemoryQueryResult, QueryResult};
use crate::route::PhysicalUnit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    #[default]
    ConnectionStrictly,
    MemoryStrictly,
}

pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_size(&self) -> Option<u32>;

    /// Options for executing `unit`
    fn statement_options(&self, unit: &PhysicalUnit, capture_metadata: bool) -> StatementOptions {
        StatementOptions {
            return_generated_keys: unit.return_generated_keys(),
            capture_metadata,
            fetch_size: self.fetch_size(),
        }
    }

    /// Turn the backend cursor into the cursor handed to the merger
    fn wrap_query_result(&self, rows: Box<dyn QueryResult>) -> ExecResult<Box<dyn QueryResult>>;
}

#[derive(Debug, Default)]
pub struct ConnectionStrictlyStrategy;

impl ExecutionStrategy for ConnectionStrictlyStrategy {
    fn name(&self) -> &'static str {
        "connection_strictly"
    }

    fn fetch_size(&self) -> Option<u32> {
        None
    }

    fn wrap_query_result(&self, rows: Box<dyn QueryResult>) -> ExecResult<Box<dyn QueryResult>> {
        Ok(Box::new(MemoryQueryResult::load(rows)?))
    }
}

#[derive(Debug)]
pub struct MemoryStrictlyStrategy {
    fetch_size: u32,
}

impl MemoryStrictlyStrategy {
    pub fn new(fetch_size: u32) -> Self {
        Self { fetch_size }
    }
}

impl ExecutionStrategy for MemoryStrictlyStrategy {
    fn name(&self) -> &'static str {
        "memory_strictly"
    }

    fn fetch_size(&self) -> Option<u32> {
        Some(self.fetch_size)
    }

    fn wrap_query_result(&self, rows: Box<dyn QueryResult>) -> ExecResult<Box<dyn QueryResult>> {
        Ok(rows)
    }
}

pub fn strategy_for(mode: ConnectionMode, fetch_size: u32) -> Box<dyn ExecutionStrategy> {
    match mode {
        ConnectionMode::ConnectionStrictly => Box::new(ConnectionStrictlyStrategy),
        ConnectionMode::MemoryStrictly => Box::new(MemoryStrictlyStrategy::new(fetch_size)),
    }
}
