use async_trait::async_trait;
use std::sync::Arc;

use super::connection::{ConnectionGuard, ConnectionProvider};
use super::pool::WorkerPool;
use super::strategy::ExecutionStrategy;
use crate::error::{ExecResult, ExecutionError};
use crate::handler::Dispatch;
use crate::response::{ExecuteResponse, QueryOutcome, ResponseUnit};
use crate::route::{PhysicalUnit, RouteResult};

/// Executes routed units over connections the engine owns for the duration
/// of one logical statement.
///
/// Units are grouped by data source. The first group runs on the calling
/// task, every other group on the worker pool, and each group reuses one
/// connection for its units in route order.
pub struct ExecuteEngine {
    provider: Arc<dyn ConnectionProvider>,
    strategy: Arc<dyn ExecutionStrategy>,
    pool: WorkerPool,
    show_sql: bool,
}

impl ExecuteEngine {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        strategy: Arc<dyn ExecutionStrategy>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            provider,
            strategy,
            pool,
            show_sql: false,
        }
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub async fn execute(&self, route: &RouteResult, return_generated_keys: bool) -> ExecResult<ExecuteResponse> {
        if route.is_empty() {
            return Ok(ExecuteResponse::empty());
        }

        let groups = route.group_by_data_source(return_generated_keys);
        tracing::debug!(
            "Executing {} units over {} data sources ({})",
            route.len(),
            groups.len(),
            self.strategy.name()
        );

        // Every connection is acquired before the first statement is sent.
        // Guards acquired so far are released if a later acquisition fails.
        let mut guards = Vec::with_capacity(groups.len());
        for group in &groups {
            guards.push(ConnectionGuard::acquire(&self.provider, group.data_source()).await?);
        }

        let mut assigned = groups.into_iter().zip(guards);
        let (first_group, first_guard) = assigned
            .next()
            .ok_or_else(|| ExecutionError::InvalidState("route has units but no groups".to_string()))?;

        let handles: Vec<_> = assigned
            .map(|(group, guard)| {
                self.pool.spawn(run_group(
                    guard,
                    group.into_units(),
                    self.strategy.clone(),
                    self.show_sql,
                ))
            })
            .collect();

        let mut outcomes = match run_group(
            first_guard,
            first_group.into_units(),
            self.strategy.clone(),
            self.show_sql,
        )
        .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                for handle in &handles {
                    handle.abort();
                }
                return Err(e);
            }
        };

        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let joined = handle.await.unwrap_or_else(|e| {
                Err(ExecutionError::Unknown(format!("unit group task failed: {}", e)))
            });
            match joined {
                Ok(group_outcomes) => outcomes.extend(group_outcomes),
                Err(e) => {
                    for rest in pending.by_ref() {
                        rest.abort();
                    }
                    return Err(e);
                }
            }
        }

        ExecuteResponse::from_units(outcomes)
    }
}

/// Run the units of one group in order over the guarded connection.
///
/// Only the unit with dispatch index 0 captures metadata.
async fn run_group(
    mut guard: ConnectionGuard,
    units: Vec<PhysicalUnit>,
    strategy: Arc<dyn ExecutionStrategy>,
    show_sql: bool,
) -> ExecResult<Vec<ResponseUnit>> {
    let mut outcomes = Vec::with_capacity(units.len());
    for unit in &units {
        let capture = unit.index() == 0;
        if show_sql {
            tracing::info!("Actual SQL: {} ::: {}", unit.data_source(), unit.sql());
        }
        tracing::debug!("Unit {} on {}", unit.index(), guard.data_source());

        let options = strategy.statement_options(unit, capture);
        let outcome = match guard.execute(unit.sql(), options).await?.classify(unit.data_source())? {
            ResponseUnit::Query(query) => ResponseUnit::Query(QueryOutcome {
                metadata: if capture { query.metadata } else { None },
                rows: strategy.wrap_query_result(query.rows)?,
            }),
            update => update,
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[async_trait]
impl Dispatch for ExecuteEngine {
    async fn dispatch(&self, route: &RouteResult, return_generated_keys: bool) -> ExecResult<ExecuteResponse> {
        self.execute(route, return_generated_keys).await
    }

    fn mode(&self) -> &'static str {
        "connection"
    }
}
