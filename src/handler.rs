//! One logical statement, end to end
//!
//! DDL gate, dispatch through either engine, merge, then the DDL metadata
//! reload. Every failure is counted once.

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{ExecResult, ExecutionError};
use crate::merge::{MergeEngine, MergedUpdateResult};
use crate::response::ExecuteResponse;
use crate::result::LogicalResult;
use crate::route::{RouteResult, StatementKind};

/// Sends the units of a route to the backends and gathers their outcomes
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, route: &RouteResult, return_generated_keys: bool) -> ExecResult<ExecuteResponse>;

    fn mode(&self) -> &'static str;
}

pub struct BackendHandler {
    dispatcher: Arc<dyn Dispatch>,
}

impl BackendHandler {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self { dispatcher }
    }

    pub fn mode(&self) -> &'static str {
        self.dispatcher.mode()
    }

    pub async fn execute(&self, route: &RouteResult, ctx: &ExecutionContext) -> ExecResult<LogicalResult> {
        match self.run(route, ctx).await {
            Ok(result) => Ok(result),
            Err(e) => {
                ctx.metrics.record_failure(&e);
                tracing::error!("Statement failed ({}): {}", e.kind().as_str(), e);
                Err(e)
            }
        }
    }

    async fn run(&self, route: &RouteResult, ctx: &ExecutionContext) -> ExecResult<LogicalResult> {
        let statement = route.statement();

        if statement.kind() == StatementKind::Ddl && !ctx.transaction.is_ddl_allowed_now() {
            return Err(ExecutionError::Unsupported(format!(
                "DDL on table '{}' is not allowed inside an XA transaction",
                statement.single_table().unwrap_or("unknown_table")
            )));
        }

        if route.is_empty() {
            return Ok(LogicalResult::Update(MergedUpdateResult::default()));
        }

        ctx.metrics.record_statement(route.len());
        let response = self
            .dispatcher
            .dispatch(route, statement.returns_generated_keys())
            .await?;

        let merged = MergeEngine::new(ctx.merge_strategy.clone()).merge(statement, response)?;

        if statement.kind() == StatementKind::Ddl {
            if let Some(table) = statement.single_table() {
                ctx.metadata.refresh(table);
                ctx.metrics.record_refresh();
            }
        }

        Ok(merged)
    }
}
