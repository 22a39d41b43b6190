//! Prepared-statement holders as produced by the (out-of-scope) SQL
//! front-end. Only the routing/execution-relevant state is modeled.

use std::sync::Arc;

use shrike_common::datum::{Datum, Row};
use shrike_router::filter::TableFilter;
use shrike_router::table::{ColumnMeta, TableMate};

use crate::expr::Expr;

/// One select-list entry.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn expr(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Column header as seen by the client.
    pub fn label(&self) -> String {
        match &self.alias {
            Some(a) => a.clone(),
            None => self.expr.to_sql(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    /// Index into the select list.
    pub select_index: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    /// Top-level FROM entries (join list). Nested joins appear as
    /// pseudo-table filters.
    pub from: Vec<TableFilter>,
    pub select_list: Vec<SelectItem>,
    /// Grouping columns (column expressions).
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    /// SELECT ... FOR UPDATE.
    pub for_update: bool,
}

impl SelectStatement {
    pub fn new(from: Vec<TableFilter>, select_list: Vec<SelectItem>) -> Self {
        Self {
            from,
            select_list,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            for_update: false,
        }
    }

    /// All real (non-pseudo) table filters, depth-first.
    pub fn real_filters(&self) -> Vec<&TableFilter> {
        let mut out = Vec::new();
        for f in &self.from {
            f.flatten(&mut out);
        }
        out
    }

    pub fn has_aggregates(&self) -> bool {
        self.select_list.iter().any(|i| i.expr.contains_aggregate())
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregates()
    }
}

/// INSERT row source: literal values, or a streaming SELECT.
#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Row>),
    Query(Box<SelectStatement>),
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: Arc<TableMate>,
    /// Insert column list, in row order.
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table: Arc<TableMate>,
    pub filter: TableFilter,
    /// Column → bound value assignments.
    pub assignments: Vec<(String, Datum)>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub table: Arc<TableMate>,
    pub filter: TableFilter,
}

#[derive(Debug, Clone)]
pub struct CreateTableStatement {
    pub table: Arc<TableMate>,
    /// Column definitions; `type_name` carries the full DDL fragment after
    /// the column name (`BIGINT NOT NULL`).
    pub columns: Vec<ColumnMeta>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone)]
pub struct CreateIndexStatement {
    pub table: Arc<TableMate>,
    pub index_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct DropTableStatement {
    pub table: Arc<TableMate>,
    pub if_exists: bool,
}
