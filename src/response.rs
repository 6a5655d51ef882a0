//! Per-unit execution outcomes and their classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{DriverCause, ExecResult, ExecutionError};
use crate::merge::result::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Decimal,
    Text,
    Boolean,
    Timestamp,
    Binary,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub column_type: ColumnType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            table: None,
            column_type,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Column list of a row-producing statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl QueryMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Rows produced by one unit; metadata is only present when it was captured
pub struct QueryOutcome {
    pub metadata: Option<QueryMetadata>,
    pub rows: Box<dyn QueryResult>,
}

impl fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOutcome")
            .field("metadata", &self.metadata)
            .field("column_count", &self.rows.column_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

impl UpdateOutcome {
    pub fn new(affected_rows: u64, last_insert_id: u64) -> Self {
        Self {
            affected_rows,
            last_insert_id,
        }
    }
}

/// Raw result of executing one physical unit
#[derive(Debug)]
pub enum RawOutcome {
    Query(QueryOutcome),
    Update(UpdateOutcome),
    Error(DriverCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Query,
    Update,
    Error,
}

/// A successful unit outcome
#[derive(Debug)]
pub enum ResponseUnit {
    Query(QueryOutcome),
    Update(UpdateOutcome),
}

impl RawOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RawOutcome::Query(_) => OutcomeKind::Query,
            RawOutcome::Update(_) => OutcomeKind::Update,
            RawOutcome::Error(_) => OutcomeKind::Error,
        }
    }

    /// Tag the outcome, turning a backend error into a driver error
    pub fn classify(self, data_source: &str) -> ExecResult<ResponseUnit> {
        match self {
            RawOutcome::Query(query) => Ok(ResponseUnit::Query(query)),
            RawOutcome::Update(update) => Ok(ResponseUnit::Update(update)),
            RawOutcome::Error(cause) => Err(ExecutionError::driver(data_source, cause)),
        }
    }
}

/// Outcome of a whole dispatch, before merging
pub enum ExecuteResponse {
    Query {
        metadata: Arc<QueryMetadata>,
        results: Vec<Box<dyn QueryResult>>,
    },
    Update {
        units: Vec<UpdateOutcome>,
    },
}

impl fmt::Debug for ExecuteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecuteResponse::Query { metadata, results } => f
                .debug_struct("Query")
                .field("metadata", metadata)
                .field("results", &results.len())
                .finish(),
            ExecuteResponse::Update { units } => {
                f.debug_struct("Update").field("units", units).finish()
            }
        }
    }
}

impl ExecuteResponse {
    /// Response for a route with no units
    pub fn empty() -> Self {
        ExecuteResponse::Update { units: Vec::new() }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, ExecuteResponse::Query { .. })
    }

    /// Build the response from unit outcomes given in dispatch order.
    ///
    /// The first unit decides the shape. Metadata comes from the first unit
    /// that reports any; outcomes of the other shape are skipped.
    pub fn from_units(units: Vec<ResponseUnit>) -> ExecResult<Self> {
        let first_is_query = match units.first() {
            None => return Ok(Self::empty()),
            Some(first) => matches!(first, ResponseUnit::Query(_)),
        };

        if first_is_query {
            let mut metadata = None;
            let mut results = Vec::with_capacity(units.len());
            for unit in units {
                match unit {
                    ResponseUnit::Query(query) => {
                        if metadata.is_none() {
                            metadata = query.metadata;
                        }
                        results.push(query.rows);
                    }
                    ResponseUnit::Update(update) => {
                        tracing::warn!(
                            "Skipping update outcome ({} rows) inside a query response",
                            update.affected_rows
                        );
                    }
                }
            }
            let metadata = metadata.ok_or_else(|| {
                ExecutionError::InvalidState("no unit reported result metadata".to_string())
            })?;
            Ok(ExecuteResponse::Query {
                metadata: Arc::new(metadata),
                results,
            })
        } else {
            let mut updates = Vec::with_capacity(units.len());
            for unit in units {
                match unit {
                    ResponseUnit::Update(update) => updates.push(update),
                    ResponseUnit::Query(_) => {
                        tracing::warn!("Skipping query outcome inside an update response");
                    }
                }
            }
            Ok(ExecuteResponse::Update { units: updates })
        }
    }
}
