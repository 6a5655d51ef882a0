//! Logical result handed to the protocol layer
//!
//! A query result is a forward-only cursor: call [`LogicalResult::advance`]
//! until it returns `false`, reading the current row with
//! [`LogicalResult::value_at`] in between. An update result only carries the
//! merged counts. Column indexes are 0-based.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ExecResult, ExecutionError};
use crate::merge::{MergedResult, MergedUpdateResult};
use crate::response::QueryMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    OnRow,
    Exhausted,
}

/// Merged rows of a query, with the statement's single metadata set
pub struct QueryResponse {
    metadata: Arc<QueryMetadata>,
    merged: Box<dyn MergedResult>,
    state: CursorState,
}

impl QueryResponse {
    pub fn metadata(&self) -> &QueryMetadata {
        &self.metadata
    }

    pub fn advance(&mut self) -> ExecResult<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        match self.merged.next() {
            Ok(true) => {
                self.state = CursorState::OnRow;
                Ok(true)
            }
            Ok(false) => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(e) => {
                self.state = CursorState::Exhausted;
                Err(e)
            }
        }
    }

    pub fn value_at(&self, column_index: usize) -> ExecResult<&Value> {
        match self.state {
            CursorState::OnRow => {}
            CursorState::BeforeFirst => {
                return Err(ExecutionError::InvalidState(
                    "value read before the first advance".to_string(),
                ))
            }
            CursorState::Exhausted => {
                return Err(ExecutionError::InvalidState(
                    "value read after the cursor was exhausted".to_string(),
                ))
            }
        }
        if column_index >= self.metadata.column_count() {
            return Err(ExecutionError::InvalidState(format!(
                "column index {} out of range ({} columns)",
                column_index,
                self.metadata.column_count()
            )));
        }
        self.merged.value(column_index)
    }

    pub fn row(&self) -> ExecResult<Vec<Value>> {
        (0..self.metadata.column_count())
            .map(|i| self.value_at(i).cloned())
            .collect()
    }
}

/// Outcome of one logical statement
pub enum LogicalResult {
    Query(QueryResponse),
    Update(MergedUpdateResult),
}

impl std::fmt::Debug for LogicalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalResult::Query(query) => f
                .debug_struct("Query")
                .field("metadata", &query.metadata)
                .field("state", &query.state)
                .finish(),
            LogicalResult::Update(update) => f.debug_tuple("Update").field(update).finish(),
        }
    }
}

impl LogicalResult {
    pub fn query(metadata: Arc<QueryMetadata>, merged: Box<dyn MergedResult>) -> Self {
        LogicalResult::Query(QueryResponse {
            metadata,
            merged,
            state: CursorState::BeforeFirst,
        })
    }

    pub fn is_query(&self) -> bool {
        matches!(self, LogicalResult::Query(_))
    }

    pub fn metadata(&self) -> Option<&QueryMetadata> {
        match self {
            LogicalResult::Query(query) => Some(query.metadata()),
            LogicalResult::Update(_) => None,
        }
    }

    pub fn column_count(&self) -> usize {
        self.metadata().map(|m| m.column_count()).unwrap_or(0)
    }

    /// Move to the next merged row; `false` is terminal
    pub fn advance(&mut self) -> ExecResult<bool> {
        match self {
            LogicalResult::Query(query) => query.advance(),
            LogicalResult::Update(_) => Err(ExecutionError::InvalidState(
                "update results have no rows to advance over".to_string(),
            )),
        }
    }

    pub fn value_at(&self, column_index: usize) -> ExecResult<&Value> {
        match self {
            LogicalResult::Query(query) => query.value_at(column_index),
            LogicalResult::Update(_) => Err(ExecutionError::InvalidState(
                "update results have no row values".to_string(),
            )),
        }
    }

    /// Read the current value converted to `T`
    pub fn value_as<T: DeserializeOwned>(&self, column_index: usize) -> ExecResult<T> {
        let value = self.value_at(column_index)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ExecutionError::InvalidState(format!(
                "column {} holds {} which cannot be read as {}: {}",
                column_index,
                value,
                std::any::type_name::<T>(),
                e
            ))
        })
    }

    /// All values of the current row
    pub fn row(&self) -> ExecResult<Vec<Value>> {
        match self {
            LogicalResult::Query(query) => query.row(),
            LogicalResult::Update(_) => Err(ExecutionError::InvalidState(
                "update results have no row values".to_string(),
            )),
        }
    }

    /// Consume the remaining rows
    pub fn drain_rows(&mut self) -> ExecResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while self.advance()? {
            rows.push(self.row()?);
        }
        Ok(rows)
    }

    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            LogicalResult::Update(update) => Some(update.affected_rows),
            LogicalResult::Query(_) => None,
        }
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        match self {
            LogicalResult::Update(update) => Some(update.last_insert_id),
            LogicalResult::Query(_) => None,
        }
    }
}
