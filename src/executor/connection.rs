use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::response::RawOutcome;

/// Per-statement options applied by the backend connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementOptions {
    pub return_generated_keys: bool,
    /// Ask the backend to report column metadata with the rows
    pub capture_metadata: bool,
    /// Rows per round trip when streaming; `None` lets the backend decide
    pub fetch_size: Option<u32>,
}

/// One backend connection, used by a single task at a time
#[async_trait]
pub trait BackendConnection: Send {
    async fn execute(&mut self, sql: &str, options: StatementOptions) -> ExecResult<RawOutcome>;

    /// `false` once the connection is unusable and must not be pooled
    fn is_reusable(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquire a connection to `data_source`; failures are resource errors
    async fn acquire(&self, data_source: &str) -> ExecResult<Box<dyn BackendConnection>>;

    fn release(&self, data_source: &str, connection: Box<dyn BackendConnection>);
}

/// Holds an acquired connection and returns it to its provider on drop
pub struct ConnectionGuard {
    provider: Arc<dyn ConnectionProvider>,
    data_source: String,
    connection: Option<Box<dyn BackendConnection>>,
}

impl ConnectionGuard {
    pub async fn acquire(provider: &Arc<dyn ConnectionProvider>, data_source: &str) -> ExecResult<Self> {
        let connection = provider.acquire(data_source).await?;
        tracing::debug!("Acquired connection to {}", data_source);
        Ok(Self {
            provider: provider.clone(),
            data_source: data_source.to_string(),
            connection: Some(connection),
        })
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub async fn execute(&mut self, sql: &str, options: StatementOptions) -> ExecResult<RawOutcome> {
        match self.connection.as_mut() {
            Some(connection) => connection.execute(sql, options).await,
            None => Err(ExecutionError::InvalidState(format!(
                "connection to {} was already released",
                self.data_source
            ))),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!("Releasing connection to {}", self.data_source);
            self.provider.release(&self.data_source, connection);
        }
    }
}
