//! Row cursors produced by backends and by merge strategies

use serde_json::Value;
use std::collections::VecDeque;

use crate::error::{ExecResult, ExecutionError};

/// Forward-only cursor over the rows one physical statement produced
pub trait QueryResult: Send {
    /// Move to the next row; `false` once the rows are exhausted
    fn next(&mut self) -> ExecResult<bool>;

    /// Value of a column (0-based) in the current row
    fn value(&self, column_index: usize) -> ExecResult<&Value>;

    fn column_count(&self) -> usize;
}

/// Forward-only cursor over the merged rows of one logical statement
pub trait MergedResult: Send {
    fn next(&mut self) -> ExecResult<bool>;

    fn value(&self, column_index: usize) -> ExecResult<&Value>;
}

/// Rows fully loaded into memory
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    rows: Vec<Vec<Value>>,
    column_count: usize,
    // 0 = before first row, n = rows[n - 1]
    cursor: usize,
}

impl MemoryQueryResult {
    pub fn new(column_count: usize, rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            column_count,
            cursor: 0,
        }
    }

    /// Drain another cursor into memory
    pub fn load(mut source: Box<dyn QueryResult>) -> ExecResult<Self> {
        let column_count = source.column_count();
        let mut rows = Vec::new();
        while source.next()? {
            let mut row = Vec::with_capacity(column_count);
            for i in 0..column_count {
                row.push(source.value(i)?.clone());
            }
            rows.push(row);
        }
        Ok(Self::new(column_count, rows))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> ExecResult<bool> {
        if self.cursor < self.rows.len() {
            self.cursor += 1;
            Ok(true)
        } else {
            self.cursor = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn value(&self, column_index: usize) -> ExecResult<&Value> {
        let row = self
            .cursor
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| ExecutionError::InvalidState("cursor is not positioned on a row".to_string()))?;
        row.get(column_index).ok_or_else(|| {
            ExecutionError::InvalidState(format!(
                "column index {} out of range ({} columns)",
                column_index,
                row.len()
            ))
        })
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}

/// Concatenates unit cursors in the order they were handed over
pub struct IteratorMergedResult {
    pending: VecDeque<Box<dyn QueryResult>>,
    current: Option<Box<dyn QueryResult>>,
}

impl IteratorMergedResult {
    pub fn new(results: Vec<Box<dyn QueryResult>>) -> Self {
        Self {
            pending: results.into(),
            current: None,
        }
    }
}

impl MergedResult for IteratorMergedResult {
    fn next(&mut self) -> ExecResult<bool> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if current.next()? {
                    return Ok(true);
                }
            }
            match self.pending.pop_front() {
                Some(next) => self.current = Some(next),
                None => {
                    self.current = None;
                    return Ok(false);
                }
            }
        }
    }

    fn value(&self, column_index: usize) -> ExecResult<&Value> {
        match self.current.as_ref() {
            Some(current) => current.value(column_index),
            None => Err(ExecutionError::InvalidState(
                "merged cursor is not positioned on a row".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(ids: &[i64]) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::new(
            1,
            ids.iter().map(|id| vec![json!(id)]).collect(),
        ))
    }

    #[test]
    fn test_memory_cursor() {
        let mut result = MemoryQueryResult::new(2, vec![vec![json!(1), json!("a")]]);
        assert!(result.value(0).is_err());
        assert!(result.next().unwrap());
        assert_eq!(result.value(1).unwrap(), &json!("a"));
        assert!(result.value(2).is_err());
        assert!(!result.next().unwrap());
        assert!(result.value(0).is_err());
        assert!(!result.next().unwrap());
    }

    #[test]
    fn test_load_drains_source() {
        let loaded = MemoryQueryResult::load(rows(&[1, 2, 3])).unwrap();
        assert_eq!(loaded.row_count(), 3);
        assert_eq!(loaded.column_count(), 1);
    }

    #[test]
    fn test_iterator_merge_skips_empty_results() {
        let mut merged = IteratorMergedResult::new(vec![rows(&[1]), rows(&[]), rows(&[2, 3])]);
        let mut seen = Vec::new();
        while merged.next().unwrap() {
            seen.push(merged.value(0).unwrap().as_i64().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(merged.value(0).is_err());
    }

    #[test]
    fn test_iterator_merge_empty() {
        let mut merged = IteratorMergedResult::new(Vec::new());
        assert!(!merged.next().unwrap());
    }
}
