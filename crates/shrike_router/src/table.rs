//! Table metadata as the router sees it: logical schema plus routing rule.

use shrike_common::error::SqlError;

use crate::object_node::ObjectNode;
use crate::rule::TableRule;

/// One column of a logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Backend type name as reported by metadata introspection
    /// (`BIGINT`, `VARCHAR(64)`, ...). Informational only; routing never
    /// interprets it.
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A logical table bound to its routing rule. Read-mostly after
/// configuration load; shared across concurrently-executing statements
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TableMate {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub rule: TableRule,
}

impl TableMate {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMeta>, rule: TableRule) -> Self {
        Self {
            name: name.into(),
            columns,
            rule,
        }
    }

    pub fn column_index(&self, column: &str) -> Result<usize, SqlError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| SqlError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn rule_columns(&self) -> &[String] {
        self.rule.rule_columns()
    }

    /// The designated node for authoritative schema introspection.
    pub fn metadata_node(&self) -> &ObjectNode {
        self.rule.metadata_node()
    }

    /// Replace the column list with metadata fetched from the metadata
    /// node (DDL introspection after CREATE TABLE).
    pub fn load_metadata(&mut self, columns: Vec<ColumnMeta>) {
        self.columns = columns;
    }
}
