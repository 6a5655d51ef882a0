//! Merge dispatch
//!
//! Selects how unit outcomes become one logical outcome based on the
//! statement kind and the shape of the dispatch response.

pub mod result;
pub mod strategy;
pub mod update;

use std::sync::Arc;

pub use result::{IteratorMergedResult, MemoryQueryResult, MergedResult, QueryResult};
pub use strategy::{IteratorMergeStrategy, MergeStrategy};
pub use update::MergedUpdateResult;

use crate::error::ExecResult;
use crate::response::ExecuteResponse;
use crate::result::LogicalResult;
use crate::route::{SqlStatement, StatementKind};

pub struct MergeEngine {
    strategy: Arc<dyn MergeStrategy>,
}

impl MergeEngine {
    pub fn new(strategy: Arc<dyn MergeStrategy>) -> Self {
        Self { strategy }
    }

    pub fn merge(&self, statement: &SqlStatement, response: ExecuteResponse) -> ExecResult<LogicalResult> {
        match response {
            ExecuteResponse::Query { metadata, results } => {
                tracing::debug!(
                    "Merging {} query results ({:?}, {} columns)",
                    results.len(),
                    statement.kind(),
                    metadata.column_count()
                );
                let merged = self.strategy.merge_rows(statement, &metadata, results)?;
                Ok(LogicalResult::query(metadata, merged))
            }
            ExecuteResponse::Update { units } => {
                let summary = match statement.kind() {
                    StatementKind::Dml | StatementKind::Dql | StatementKind::Dal => {
                        MergedUpdateResult::merge(&units)
                    }
                    StatementKind::Ddl | StatementKind::Tcl | StatementKind::Dcl => {
                        MergedUpdateResult::first(&units)
                    }
                };
                Ok(LogicalResult::Update(summary))
            }
        }
    }
}
