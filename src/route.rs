//! Routing decisions handed to the execution engine
//!
//! The router is an external collaborator: by the time a statement reaches
//! this crate it has already been split into physical statements, each bound
//! to one data source. This module only groups those units for dispatch.

use serde::{Deserialize, Serialize};

/// Statement category, as judged by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Dql,
    Dml,
    Ddl,
    Tcl,
    Dal,
    Dcl,
}

/// Parsed statement handle carried alongside the route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub kind: StatementKind,
    /// Logical tables touched by the statement
    #[serde(default)]
    pub tables: Vec<String>,
    /// INSERT statements ask backends for generated keys
    #[serde(default, rename = "insert")]
    pub is_insert: bool,
}

impl SqlStatement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: Vec::new(),
            is_insert: false,
        }
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Dml,
            tables: vec![table.into()],
            is_insert: true,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn returns_generated_keys(&self) -> bool {
        self.is_insert
    }

    /// First logical table, used when one table is enough (DDL metadata reload)
    pub fn single_table(&self) -> Option<&str> {
        self.tables.first().map(|t| t.as_str())
    }
}

/// One routed physical statement as produced by the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUnit {
    pub data_source: String,
    pub sql: String,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            sql: sql.into(),
        }
    }
}

/// Routing decision for one logical statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    statement: SqlStatement,
    units: Vec<RouteUnit>,
}

impl RouteResult {
    pub fn new(statement: SqlStatement) -> Self {
        Self {
            statement,
            units: Vec::new(),
        }
    }

    pub fn with_units(statement: SqlStatement, units: Vec<RouteUnit>) -> Self {
        Self { statement, units }
    }

    pub fn with_unit(mut self, data_source: impl Into<String>, sql: impl Into<String>) -> Self {
        self.units.push(RouteUnit::new(data_source, sql));
        self
    }

    pub fn statement(&self) -> &SqlStatement {
        &self.statement
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Distinct data sources, in the order they first appear
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source.as_str()) {
                names.push(&unit.data_source);
            }
        }
        names
    }

    /// Group units by data source for dispatch.
    ///
    /// Groups follow the order in which each data source first appears and
    /// keep route order inside a group. Unit indexes are assigned in the
    /// resulting dispatch order, so index 0 is the first unit of the first
    /// group.
    pub fn group_by_data_source(&self, return_generated_keys: bool) -> Vec<UnitGroup> {
        let mut by_source: Vec<(&str, Vec<&str>)> = Vec::new();
        for unit in &self.units {
            match by_source.iter_mut().find(|(name, _)| *name == unit.data_source) {
                Some((_, sqls)) => sqls.push(unit.sql.as_str()),
                None => by_source.push((unit.data_source.as_str(), vec![unit.sql.as_str()])),
            }
        }

        let mut index = 0;
        by_source
            .into_iter()
            .map(|(data_source, sqls)| UnitGroup {
                data_source: data_source.to_string(),
                units: sqls
                    .into_iter()
                    .map(|sql| {
                        let unit = PhysicalUnit {
                            index,
                            data_source: data_source.to_string(),
                            sql: sql.to_string(),
                            return_generated_keys,
                        };
                        index += 1;
                        unit
                    })
                    .collect(),
            })
            .collect()
    }
}

/// One physical statement bound to one data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalUnit {
    index: usize,
    data_source: String,
    sql: String,
    return_generated_keys: bool,
}

impl PhysicalUnit {
    /// Position of the unit in dispatch order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn return_generated_keys(&self) -> bool {
        self.return_generated_keys
    }
}

/// Units that share one data source, executed over one connection
#[derive(Debug, Clone)]
pub struct UnitGroup {
    data_source: String,
    units: Vec<PhysicalUnit>,
}

impl UnitGroup {
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn units(&self) -> &[PhysicalUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_units(self) -> Vec<PhysicalUnit> {
        self.units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> RouteResult {
        RouteResult::new(SqlStatement::new(StatementKind::Dql).with_table("t_order"))
            .with_unit("ds_0", "SELECT * FROM t_order_0")
            .with_unit("ds_1", "SELECT * FROM t_order_0")
            .with_unit("ds_0", "SELECT * FROM t_order_1")
    }

    #[test]
    fn test_group_preserves_first_appearance() {
        let groups = route().group_by_data_source(false);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].data_source(), "ds_0");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].data_source(), "ds_1");

        let sqls: Vec<&str> = groups[0].units().iter().map(|u| u.sql()).collect();
        assert_eq!(sqls, vec!["SELECT * FROM t_order_0", "SELECT * FROM t_order_1"]);
    }

    #[test]
    fn test_interleaved_units_are_numbered_after_grouping() {
        let groups = route().group_by_data_source(false);
        let ds_0 = groups[0].units();
        assert_eq!((ds_0[1].index(), ds_0[1].sql()), (1, "SELECT * FROM t_order_1"));
        let ds_1 = &groups[1].units()[0];
        assert_eq!((ds_1.index(), ds_1.data_source()), (2, "ds_1"));
    }

    #[test]
    fn test_indexes_follow_dispatch_order() {
        let groups = route().group_by_data_source(true);
        let indexes: Vec<usize> = groups
            .iter()
            .flat_map(|g| g.units().iter().map(|u| u.index()))
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(groups[1].units()[0].return_generated_keys());
        assert_eq!(groups[1].units()[0].data_source(), "ds_1");
    }

    #[test]
    fn test_empty_route() {
        let route = RouteResult::new(SqlStatement::new(StatementKind::Dml));
        assert!(route.is_empty());
        assert!(route.group_by_data_source(false).is_empty());
        assert!(route.data_source_names().is_empty());
    }

    #[test]
    fn test_statement_helpers() {
        let stmt = SqlStatement::insert("t_user");
        assert!(stmt.returns_generated_keys());
        assert_eq!(stmt.kind(), StatementKind::Dml);
        assert_eq!(stmt.single_table(), Some("t_user"));
        assert_eq!(route().data_source_names(), vec!["ds_0", "ds_1"]);
    }

    #[test]
    fn test_statement_json_shape() {
        let stmt: SqlStatement =
            serde_json::from_str(r#"{"kind":"DDL","tables":["t_order"]}"#).unwrap();
        assert_eq!(stmt.kind(), StatementKind::Ddl);
        assert!(!stmt.is_insert);
    }
}
