//! The filter model consumed from the SQL front-end: per-table index
//! conditions and equality join edges, as a closed tagged-variant AST.

use std::sync::Arc;

use shrike_common::datum::Datum;

use crate::table::TableMate;

/// Reference to a column of an aliased table in the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table_alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table_alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

/// One index condition accumulated on a table filter by the front-end
/// optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCondition {
    /// `col = v` or `col IN (v1, ..., vn)`.
    Equality { column: String, values: Vec<Datum> },
    /// `col >= low` / `col <= high` pair; either side may be unbounded.
    Range {
        column: String,
        low: Option<Datum>,
        high: Option<Datum>,
    },
}

impl IndexCondition {
    pub fn eq(column: impl Into<String>, value: Datum) -> Self {
        IndexCondition::Equality {
            column: column.into(),
            values: vec![value],
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Datum>) -> Self {
        IndexCondition::Equality {
            column: column.into(),
            values,
        }
    }

    pub fn range(column: impl Into<String>, low: Option<Datum>, high: Option<Datum>) -> Self {
        IndexCondition::Range {
            column: column.into(),
            low,
            high,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            IndexCondition::Equality { column, .. } => column,
            IndexCondition::Range { column, .. } => column,
        }
    }
}

/// An equality join edge between two table filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl JoinCondition {
    pub fn new(left: ColumnRef, right: ColumnRef) -> Self {
        Self { left, right }
    }

    /// The side of this edge belonging to `alias`, if any.
    pub fn side_for(&self, alias: &str) -> Option<&ColumnRef> {
        if self.left.table_alias == alias {
            Some(&self.left)
        } else if self.right.table_alias == alias {
            Some(&self.right)
        } else {
            None
        }
    }

    /// The opposite side of this edge relative to `alias`, if `alias`
    /// participates.
    pub fn other_side(&self, alias: &str) -> Option<&ColumnRef> {
        if self.left.table_alias == alias {
            Some(&self.right)
        } else if self.right.table_alias == alias {
            Some(&self.left)
        } else {
            None
        }
    }
}

/// What a table filter scans.
#[derive(Debug, Clone)]
pub enum FilterSource {
    /// A routable table.
    Table(Arc<TableMate>),
    /// A nested-join pseudo-table wrapping child filters.
    NestedJoin(Vec<TableFilter>),
}

/// One entry of the query's FROM list, with the conditions the front-end
/// optimizer pushed onto it.
#[derive(Debug, Clone)]
pub struct TableFilter {
    pub alias: String,
    pub source: FilterSource,
    pub conditions: Vec<IndexCondition>,
    /// Equality join edges connecting this filter to other filters.
    pub joins: Vec<JoinCondition>,
}

impl TableFilter {
    pub fn table(alias: impl Into<String>, table: Arc<TableMate>) -> Self {
        Self {
            alias: alias.into(),
            source: FilterSource::Table(table),
            conditions: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn nested(alias: impl Into<String>, children: Vec<TableFilter>) -> Self {
        Self {
            alias: alias.into(),
            source: FilterSource::NestedJoin(children),
            conditions: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn with_condition(mut self, c: IndexCondition) -> Self {
        self.conditions.push(c);
        self
    }

    pub fn with_join(mut self, j: JoinCondition) -> Self {
        self.joins.push(j);
        self
    }

    pub fn table_mate(&self) -> Option<&Arc<TableMate>> {
        match &self.source {
            FilterSource::Table(t) => Some(t),
            FilterSource::NestedJoin(_) => None,
        }
    }

    /// Flatten this filter and any nested-join children into the list of
    /// real table filters, depth-first.
    pub fn flatten<'a>(&'a self, out: &mut Vec<&'a TableFilter>) {
        match &self.source {
            FilterSource::Table(_) => out.push(self),
            FilterSource::NestedJoin(children) => {
                for child in children {
                    child.flatten(out);
                }
            }
        }
    }
}
