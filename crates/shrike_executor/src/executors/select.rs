//! SELECT execution: estimator-gated push-down via [`DirectLookupCursor`],
//! with the generic multi-worker path as fallback — per-table routing plus
//! a coordinator-side nested-loop join over the fetched row sets.

use std::collections::HashMap;

use shrike_common::datum::Row;
use shrike_common::error::{ShrikeResult, SqlError};
use shrike_router::filter::{JoinCondition, TableFilter};
use shrike_router::handler::RoutingHandler;

use crate::cursor::{drain, Cursor, MemoryCursor};
use crate::direct_lookup::{DirectLookupCursor, DirectLookupEstimator};
use crate::expr::Expr;
use crate::framework::{explain_workers, invoke_query_workers, Executor};
use crate::session::Session;
use crate::statement::SelectStatement;
use crate::translate::SelectPushdown;
use crate::worker::{QueryWorker, WorkerFactory};

enum Mode {
    NotPrepared,
    Direct(Box<DirectLookupCursor>),
    Join(JoinFallback),
}

pub struct SelectExecutor {
    stmt: SelectStatement,
    factory: WorkerFactory,
    mode: Mode,
}

impl SelectExecutor {
    pub fn new(stmt: SelectStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            mode: Mode::NotPrepared,
        }
    }
}

impl Executor for SelectExecutor {
    fn prepare(&mut self, session: &Session) -> ShrikeResult<()> {
        if !matches!(self.mode, Mode::NotPrepared) {
            return Ok(());
        }
        // Locking reads cannot be combined with shapes that require
        // client-side merging: the lock scope would not match the rows the
        // client observes.
        if self.stmt.for_update
            && (self.stmt.is_grouped() || self.stmt.distinct || self.stmt.real_filters().len() > 1)
        {
            return Err(SqlError::Unsupported(
                "SELECT ... FOR UPDATE with GROUP BY, DISTINCT, or JOIN".into(),
            )
            .into());
        }

        if DirectLookupEstimator::is_direct_lookup(&self.stmt) {
            let cursor =
                DirectLookupCursor::prepare(session, self.stmt.clone(), self.factory.clone())?;
            self.mode = Mode::Direct(Box::new(cursor));
        } else {
            let fallback = JoinFallback::prepare(&self.stmt, &self.factory)?;
            self.mode = Mode::Join(fallback);
        }
        Ok(())
    }

    fn query(&mut self, session: &Session) -> ShrikeResult<Box<dyn Cursor>> {
        self.prepare(session)?;
        match std::mem::replace(&mut self.mode, Mode::NotPrepared) {
            Mode::Direct(mut cursor) => {
                cursor.execute(session)?;
                Ok(cursor as Box<dyn Cursor>)
            }
            Mode::Join(fallback) => fallback.query(session, &self.stmt),
            Mode::NotPrepared => unreachable!("prepare ran above"),
        }
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        let _ = session;
        match &self.mode {
            Mode::NotPrepared => Ok("NOT_PREPARED".to_string()),
            Mode::Direct(cursor) => Ok(cursor.explain()),
            Mode::Join(fallback) => Ok(explain_workers(&fallback.descriptions())),
        }
    }
}

// ── generic multi-worker fallback ────────────────────────────────────────────

/// Per-table routing + coordinator-side nested-loop join, for joins the
/// estimator rejected (tables not co-partitioned). Each table's rows are
/// fetched with its own pushed-down conditions, then joined here.
struct FilterFetch {
    alias: String,
    /// Fetched column names, in fetch order.
    columns: Vec<String>,
    workers: Vec<QueryWorker>,
    descriptions: Vec<String>,
}

struct JoinFallback {
    fetches: Vec<FilterFetch>,
    /// Select items resolved as (alias, column).
    select_cols: Vec<(String, String)>,
    joins: Vec<JoinCondition>,
}

impl JoinFallback {
    fn prepare(stmt: &SelectStatement, factory: &WorkerFactory) -> ShrikeResult<Self> {
        if stmt.is_grouped() {
            return Err(SqlError::Unsupported(
                "aggregation over a non-colocated join".into(),
            )
            .into());
        }
        let filters = stmt.real_filters();

        // Select items must be alias-qualified plain columns; anything else
        // cannot be recomputed from the joined row sets.
        let mut select_cols = Vec::with_capacity(stmt.select_list.len());
        for item in &stmt.select_list {
            match &item.expr {
                Expr::Column {
                    table_alias: Some(alias),
                    name,
                } => select_cols.push((alias.clone(), name.clone())),
                other => {
                    return Err(SqlError::Unsupported(format!(
                        "cross-node join cannot evaluate '{}'",
                        other.to_sql()
                    ))
                    .into())
                }
            }
        }

        let joins: Vec<JoinCondition> = filters
            .iter()
            .flat_map(|f| f.joins.iter().cloned())
            .collect();

        let mut fetches = Vec::with_capacity(filters.len());
        for filter in &filters {
            let fetch = Self::prepare_fetch(filter, &select_cols, &joins, factory)?;
            fetches.push(fetch);
        }
        Ok(Self {
            fetches,
            select_cols,
            joins,
        })
    }

    fn prepare_fetch(
        filter: &TableFilter,
        select_cols: &[(String, String)],
        joins: &[JoinCondition],
        factory: &WorkerFactory,
    ) -> ShrikeResult<FilterFetch> {
        let mate = filter.table_mate().ok_or_else(|| {
            SqlError::Unsupported("nested join in cross-node fallback".into())
        })?;

        let mut columns: Vec<String> = Vec::new();
        let mut push_col = |name: &str| {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                columns.push(name.to_string());
            }
        };
        for (alias, col) in select_cols {
            if *alias == filter.alias {
                push_col(col);
            }
        }
        for join in joins {
            if let Some(side) = join.side_for(&filter.alias) {
                push_col(&side.column);
            }
        }

        let items: Vec<String> = if columns.is_empty() {
            vec!["1".to_string()]
        } else {
            columns
                .iter()
                .map(|c| format!("`{}`.`{}`", filter.alias, c))
                .collect()
        };

        let route = RoutingHandler::route_read(mate, filter)?;
        let mut workers = Vec::new();
        let mut descriptions = Vec::new();
        for node in route.selected() {
            let plan = SelectPushdown {
                items: items.clone(),
                filters: vec![filter],
                group_by: Vec::new(),
                order_by: Vec::new(),
                limit: None,
                offset: None,
                distinct: false,
                for_update: false,
            };
            let mut consistency = HashMap::new();
            consistency.insert(filter.alias.clone(), node.clone());
            let sql = factory.translator().select(&plan, &[consistency])?;
            let worker = factory.query_worker(
                shrike_router::object_node::RouteNode::Single(node.clone()),
                sql,
            );
            descriptions.push(worker.describe());
            workers.push(worker);
        }

        Ok(FilterFetch {
            alias: filter.alias.clone(),
            columns,
            workers,
            descriptions,
        })
    }

    fn descriptions(&self) -> Vec<String> {
        self.fetches
            .iter()
            .flat_map(|f| f.descriptions.iter().cloned())
            .collect()
    }

    /// Fetch every table's rows, then join at the coordinator. Guarantees
    /// cross-node correctness (no missing matches) at the cost of
    /// materializing each side.
    fn query(self, session: &Session, stmt: &SelectStatement) -> ShrikeResult<Box<dyn Cursor>> {
        let mut joined_aliases: Vec<String> = Vec::new();
        // (alias → column offset base), combined rows.
        let mut offsets: HashMap<String, (usize, Vec<String>)> = HashMap::new();
        let mut acc: Vec<Row> = Vec::new();
        let mut width = 0usize;

        for (step, fetch) in self.fetches.into_iter().enumerate() {
            let mut cursor = invoke_query_workers(session, fetch.workers)?;
            let rows = drain(cursor.as_mut())?;
            tracing::debug!(
                alias = fetch.alias.as_str(),
                rows = rows.len(),
                "cross-node join input fetched"
            );

            if step == 0 {
                acc = rows;
                offsets.insert(fetch.alias.clone(), (0, fetch.columns.clone()));
                width = fetch.columns.len().max(1);
                joined_aliases.push(fetch.alias);
                continue;
            }

            // Join conditions applicable at this step: one side is the new
            // alias, the other is already joined.
            let applicable: Vec<&JoinCondition> = self
                .joins
                .iter()
                .filter(|j| {
                    j.side_for(&fetch.alias).is_some()
                        && j.other_side(&fetch.alias)
                            .map(|o| joined_aliases.contains(&o.table_alias))
                            .unwrap_or(false)
                })
                .collect();

            let col_of = |alias: &str,
                          col: &str,
                          offsets: &HashMap<String, (usize, Vec<String>)>|
             -> Option<usize> {
                let (base, cols) = offsets.get(alias)?;
                cols.iter()
                    .position(|c| c.eq_ignore_ascii_case(col))
                    .map(|i| base + i)
            };

            let mut next_acc = Vec::new();
            for left in &acc {
                'right: for right in &rows {
                    for join in &applicable {
                        let new_side = join.side_for(&fetch.alias).expect("applicable");
                        let old_side = join.other_side(&fetch.alias).expect("applicable");
                        let old_idx =
                            col_of(&old_side.table_alias, &old_side.column, &offsets);
                        let new_idx = fetch
                            .columns
                            .iter()
                            .position(|c| c.eq_ignore_ascii_case(&new_side.column));
                        match (old_idx, new_idx) {
                            (Some(oi), Some(ni)) => {
                                if left[oi] != right[ni] {
                                    continue 'right;
                                }
                            }
                            _ => continue 'right,
                        }
                    }
                    let mut combined = left.clone();
                    combined.extend(right.iter().cloned());
                    next_acc.push(combined);
                }
            }
            offsets.insert(fetch.alias.clone(), (width, fetch.columns.clone()));
            width += fetch.columns.len().max(1);
            joined_aliases.push(fetch.alias);
            acc = next_acc;
        }

        // Project, order, dedup, window.
        let mut projected: Vec<Row> = Vec::with_capacity(acc.len());
        for row in &acc {
            let mut out = Vec::with_capacity(self.select_cols.len());
            for (alias, col) in &self.select_cols {
                let (base, cols) = offsets.get(alias).ok_or_else(|| {
                    SqlError::UnknownTable(alias.clone())
                })?;
                let idx = cols
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(col))
                    .ok_or_else(|| SqlError::UnknownColumn {
                        table: alias.clone(),
                        column: col.clone(),
                    })?;
                out.push(row[base + idx].clone());
            }
            projected.push(out);
        }

        if stmt.distinct {
            let mut seen = std::collections::HashSet::new();
            projected.retain(|row| seen.insert(row.clone()));
        }
        if !stmt.order_by.is_empty() {
            projected.sort_by(|a, b| {
                for o in &stmt.order_by {
                    let ord = a[o.select_index].cmp(&b[o.select_index]);
                    let ord = if o.ascending { ord } else { ord.reverse() };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        if let Some(offset) = stmt.offset {
            let offset = offset as usize;
            projected = if offset < projected.len() {
                projected.split_off(offset)
            } else {
                Vec::new()
            };
        }
        if let Some(limit) = stmt.limit {
            projected.truncate(limit as usize);
        }

        let labels: Vec<String> = stmt.select_list.iter().map(|i| i.label()).collect();
        Ok(Box::new(MemoryCursor::new(labels, projected)))
    }
}
