use super::result::{IteratorMergedResult, MergedResult, QueryResult};
use crate::error::ExecResult;
use crate::response::QueryMetadata;
use crate::route::SqlStatement;

/// Row-merging algorithm for a statement shape (ORDER BY, GROUP BY, pagination, ...).
///
/// Implementations receive unit cursors in dispatch order together with the
/// one canonical metadata set of the statement.
pub trait MergeStrategy: Send + Sync {
    fn merge_rows(
        &self,
        statement: &SqlStatement,
        metadata: &QueryMetadata,
        results: Vec<Box<dyn QueryResult>>,
    ) -> ExecResult<Box<dyn MergedResult>>;
}

/// Plain concatenation of unit rows
#[derive(Debug, Clone, Copy, Default)]
pub struct IteratorMergeStrategy;

impl MergeStrategy for IteratorMergeStrategy {
    fn merge_rows(
        &self,
        _statement: &SqlStatement,
        _metadata: &QueryMetadata,
        results: Vec<Box<dyn QueryResult>>,
    ) -> ExecResult<Box<dyn MergedResult>> {
        Ok(Box::new(IteratorMergedResult::new(results)))
    }
}
