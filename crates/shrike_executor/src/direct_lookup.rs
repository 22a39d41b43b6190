//! Push-down SELECT routing: decides whether a (possibly multi-table)
//! query can run as one query per selected node, and builds the per-node
//! workers plus the client-side correction layers (offset skip, two-phase
//! re-aggregation).

use std::collections::HashMap;

use shrike_common::datum::{Datum, Row};
use shrike_common::error::{RoutingError, ShrikeResult, SqlError};
use shrike_router::filter::TableFilter;
use shrike_router::handler::RoutingHandler;
use shrike_router::object_node::{ObjectNode, RouteNode};
use shrike_router::result::RoutingResult;
use shrike_router::rule::TableRule;
use shrike_router::table::TableMate;

use crate::cursor::{AggMerge, AggregateMergeCursor, Cursor, MemoryCursor, OffsetCursor};
use crate::expr::{AggFunc, BinOp, Expr};
use crate::framework::{explain_workers, invoke_query_workers};
use crate::session::Session;
use crate::statement::SelectStatement;
use crate::translate::SelectPushdown;
use crate::worker::{QueryWorker, WorkerFactory};

// ── feasibility ──────────────────────────────────────────────────────────────

/// Pure function of the query shape: can this SELECT be routed as a single
/// push-down query per selected node, with no cross-node join glue?
pub struct DirectLookupEstimator;

impl DirectLookupEstimator {
    pub fn is_direct_lookup(select: &SelectStatement) -> bool {
        let filters = select.real_filters();
        // 1. Every filter must be a routable table (nested joins were
        //    flattened away).
        if filters.is_empty() || filters.iter().any(|f| f.table_mate().is_none()) {
            return false;
        }

        // 2. More than one real table: all pairwise node-comparable.
        for i in 0..filters.len() {
            for j in (i + 1)..filters.len() {
                let a = filters[i].table_mate().expect("checked");
                let b = filters[j].table_mate().expect("checked");
                if !a.rule.node_comparable(&b.rule) {
                    return false;
                }
            }
        }

        // 3. Independently-sharded tables must form one equality-join chain
        //    over their full rule-column sets.
        let sharded: Vec<&&TableFilter> = filters
            .iter()
            .filter(|f| f.table_mate().map(|t| t.rule.is_sharded()).unwrap_or(false))
            .collect();
        if sharded.len() < 2 {
            return true;
        }

        // Graph reachability over valid join edges, rooted at the first
        // sharded filter.
        let mut reached = vec![false; sharded.len()];
        reached[0] = true;
        let mut frontier = vec![0usize];
        while let Some(at) = frontier.pop() {
            for (next, candidate) in sharded.iter().enumerate() {
                if !reached[next]
                    && Self::joined_on_rule_columns(sharded[at], candidate, &filters)
                {
                    reached[next] = true;
                    frontier.push(next);
                }
            }
        }
        reached.iter().all(|&r| r)
    }

    /// An edge exists between two sharded filters when, for every rule
    /// column position, an equality join condition connects `a`'s i-th
    /// rule column to `b`'s i-th rule column.
    fn joined_on_rule_columns(a: &TableFilter, b: &TableFilter, all: &[&TableFilter]) -> bool {
        let a_cols = a.table_mate().expect("sharded").rule_columns();
        let b_cols = b.table_mate().expect("sharded").rule_columns();
        if a_cols.len() != b_cols.len() {
            return false;
        }
        // Join conditions may be recorded on either endpoint filter.
        let edges = || {
            all.iter()
                .flat_map(|f| f.joins.iter())
                .filter(|j| j.side_for(&a.alias).is_some() && j.side_for(&b.alias).is_some())
        };
        a_cols.iter().zip(b_cols).all(|(ac, bc)| {
            edges().any(|j| {
                let a_side = j.side_for(&a.alias).expect("filtered");
                let b_side = j.side_for(&b.alias).expect("filtered");
                a_side.column.eq_ignore_ascii_case(ac) && b_side.column.eq_ignore_ascii_case(bc)
            })
        })
    }
}

// ── two-phase aggregation plan ───────────────────────────────────────────────

/// How the pushed-down column layout maps back onto the client select list.
struct MergePlan {
    /// Per pushed column: merge rule for the re-aggregation pass.
    merges: Vec<AggMerge>,
    /// Pushed expression → column slot, for projection evaluation.
    slots: Vec<(Expr, usize)>,
    /// Rendered pushed select expressions.
    pushed_items: Vec<String>,
    /// Rendered GROUP BY entries.
    pushed_group_by: Vec<String>,
}

fn partial_for(func: AggFunc, arg: Option<&Expr>, distinct: bool) -> Vec<Expr> {
    // AVG is recomposed client-side from pushed SUM + COUNT partials.
    match func {
        AggFunc::Avg => {
            let arg = arg.cloned().map(Box::new);
            vec![
                Expr::Aggregate {
                    func: AggFunc::Sum,
                    arg: arg.clone(),
                    distinct,
                },
                Expr::Aggregate {
                    func: AggFunc::Count,
                    arg,
                    distinct,
                },
            ]
        }
        _ => vec![Expr::Aggregate {
            func,
            arg: arg.cloned().map(Box::new),
            distinct,
        }],
    }
}

fn merge_rule(func: AggFunc) -> AggMerge {
    match func {
        // Partial COUNTs sum across nodes, as do partial SUMs.
        AggFunc::Count | AggFunc::Sum | AggFunc::Avg => AggMerge::Sum,
        AggFunc::Min => AggMerge::Min,
        AggFunc::Max => AggMerge::Max,
    }
}

fn build_merge_plan(select: &SelectStatement) -> ShrikeResult<MergePlan> {
    let mut merges = Vec::new();
    let mut slots: Vec<(Expr, usize)> = Vec::new();
    let mut pushed_items = Vec::new();
    let mut pushed_group_by = Vec::new();

    for g in &select.group_by {
        slots.push((g.clone(), pushed_items.len()));
        merges.push(AggMerge::Group);
        pushed_items.push(g.to_sql());
        pushed_group_by.push(g.to_sql());
    }

    // Aggregates actually referenced anywhere in the select list, found by
    // the expression walk; nothing unreferenced gets pushed, nothing nested
    // gets missed.
    let mut referenced: Vec<&Expr> = Vec::new();
    for item in &select.select_list {
        item.expr.referenced_aggregates(&mut referenced);
    }
    for agg in referenced {
        let Expr::Aggregate {
            func,
            arg,
            distinct,
        } = agg
        else {
            continue;
        };
        if *distinct {
            return Err(SqlError::Unsupported(
                "DISTINCT aggregate cannot be merged across nodes".into(),
            )
            .into());
        }
        for partial in partial_for(*func, arg.as_deref(), *distinct) {
            if slots.iter().any(|(e, _)| *e == partial) {
                continue;
            }
            let rule = match &partial {
                Expr::Aggregate { func, .. } => merge_rule(*func),
                _ => AggMerge::Group,
            };
            slots.push((partial.clone(), pushed_items.len()));
            merges.push(rule);
            pushed_items.push(partial.to_sql());
        }
    }

    Ok(MergePlan {
        merges,
        slots,
        pushed_items,
        pushed_group_by,
    })
}

// ── projection over merged partials ──────────────────────────────────────────

fn arith(op: BinOp, a: Datum, b: Datum) -> Datum {
    if a.is_null() || b.is_null() {
        return Datum::Null;
    }
    match (op, &a, &b) {
        (BinOp::Add, Datum::Int64(x), Datum::Int64(y)) => Datum::Int64(x + y),
        (BinOp::Sub, Datum::Int64(x), Datum::Int64(y)) => Datum::Int64(x - y),
        (BinOp::Mul, Datum::Int64(x), Datum::Int64(y)) => Datum::Int64(x * y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => match op {
                BinOp::Add => Datum::Float64(x + y),
                BinOp::Sub => Datum::Float64(x - y),
                BinOp::Mul => Datum::Float64(x * y),
                BinOp::Div => {
                    if y == 0.0 {
                        Datum::Null
                    } else {
                        Datum::Float64(x / y)
                    }
                }
            },
            _ => Datum::Null,
        },
    }
}

fn eval_projected(expr: &Expr, row: &Row, slots: &[(Expr, usize)]) -> ShrikeResult<Datum> {
    if let Some((_, i)) = slots.iter().find(|(e, _)| e == expr) {
        return Ok(row[*i].clone());
    }
    match expr {
        Expr::Value(v) => Ok(v.clone()),
        // AVG = merged SUM partial / merged COUNT partial.
        Expr::Aggregate {
            func: AggFunc::Avg,
            arg,
            distinct,
        } => {
            let sum = Expr::Aggregate {
                func: AggFunc::Sum,
                arg: arg.clone(),
                distinct: *distinct,
            };
            let count = Expr::Aggregate {
                func: AggFunc::Count,
                arg: arg.clone(),
                distinct: *distinct,
            };
            let s = eval_projected(&sum, row, slots)?;
            let c = eval_projected(&count, row, slots)?;
            Ok(arith(BinOp::Div, s, c))
        }
        Expr::Binary { op, left, right } => {
            let l = eval_projected(left, row, slots)?;
            let r = eval_projected(right, row, slots)?;
            Ok(arith(*op, l, r))
        }
        other => Err(SqlError::Unsupported(format!(
            "cannot recompute '{}' from merged partial aggregates",
            other.to_sql()
        ))
        .into()),
    }
}

/// Maps the merged partial-aggregate layout back to the client select list.
struct ProjectionCursor {
    inner: Box<dyn Cursor>,
    columns: Vec<String>,
    items: Vec<Expr>,
    slots: Vec<(Expr, usize)>,
}

impl Cursor for ProjectionCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        match self.inner.next()? {
            None => Ok(None),
            Some(row) => {
                let projected: ShrikeResult<Row> = self
                    .items
                    .iter()
                    .map(|e| eval_projected(e, &row, &self.slots))
                    .collect();
                Ok(Some(projected?))
            }
        }
    }
}

// ── the cursor itself ────────────────────────────────────────────────────────

/// Prepared push-down SELECT: per-node workers plus the client-side
/// correction stack. `next()` delegates to whichever cursor the worker
/// invocation produced — the single worker's result, or the merged union.
pub struct DirectLookupCursor {
    select: SelectStatement,
    workers: Vec<QueryWorker>,
    descriptions: Vec<String>,
    client_columns: Vec<String>,
    /// Set when the route is multi-node and an OFFSET had to be retained
    /// client-side.
    client_offset: usize,
    client_limit: Option<u64>,
    merge_plan: Option<MergePlan>,
    always_false: bool,
    inner: Option<Box<dyn Cursor>>,
}

impl DirectLookupCursor {
    /// Routes per table filter, picks the cheapest authoritative route,
    /// rewrites limit/offset and the select list, and binds one worker per
    /// target.
    pub fn prepare(
        session: &Session,
        select: SelectStatement,
        factory: WorkerFactory,
    ) -> ShrikeResult<Self> {
        let client_columns: Vec<String> =
            select.select_list.iter().map(|i| i.label()).collect();

        let filters = select.real_filters();
        let mut routes: Vec<(usize, RoutingResult)> = Vec::with_capacity(filters.len());
        for (i, filter) in filters.iter().enumerate() {
            let mate = filter
                .table_mate()
                .ok_or(RoutingError::NoCandidateRoute)?;
            routes.push((i, RoutingHandler::route_read(mate, filter)?));
        }

        if routes.iter().any(|(_, r)| r.is_empty()) {
            // Unsatisfiable predicate on some filter: nothing to execute.
            return Ok(Self {
                select,
                workers: Vec::new(),
                descriptions: Vec::new(),
                client_columns,
                client_offset: 0,
                client_limit: None,
                merge_plan: None,
                always_false: true,
                inner: None,
            });
        }

        // The smallest route among sharded filters is authoritative: the
        // estimator guaranteed node-comparability, so any one filter's
        // route determines the join's target set, and the smallest avoids
        // unnecessary broadcasts.
        let (authoritative_idx, authoritative) = routes
            .iter()
            .filter(|(i, _)| {
                filters[*i]
                    .table_mate()
                    .map(|t| t.rule.is_sharded())
                    .unwrap_or(false)
            })
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .or_else(|| routes.first())
            .map(|(i, r)| (*i, r.clone()))
            .ok_or(RoutingError::NoCandidateRoute)?;

        let multi = authoritative.is_multiple_node();
        let grouped = select.is_grouped();

        // Offset pushdown correction: OFFSET is only meaningful against a
        // single ordered stream, so a multi-node route pushes
        // limit' = limit+offset, offset' = 0 and skips client-side.
        let (pushed_limit, pushed_offset, client_offset, client_limit);
        if multi && grouped {
            // Re-aggregation needs every group from every node.
            pushed_limit = None;
            pushed_offset = None;
            client_offset = select.offset.unwrap_or(0) as usize;
            client_limit = select.limit;
        } else if multi {
            // Each node over-fetches up to limit+offset; the true window is
            // applied client-side over the merged stream.
            let offset = select.offset.unwrap_or(0);
            pushed_limit = select.limit.map(|l| l + offset);
            pushed_offset = None;
            client_offset = offset as usize;
            client_limit = select.limit;
        } else {
            pushed_limit = select.limit;
            pushed_offset = select.offset;
            client_offset = 0;
            client_limit = None;
        }

        let merge_plan = if multi && grouped {
            Some(build_merge_plan(&select)?)
        } else {
            None
        };

        let (pushed_items, pushed_group_by) = match &merge_plan {
            Some(plan) => (plan.pushed_items.clone(), plan.pushed_group_by.clone()),
            None => (
                select.select_list.iter().map(|i| i.expr.to_sql()).collect(),
                select.group_by.iter().map(|g| g.to_sql()).collect(),
            ),
        };

        // ORDER BY survives pushdown only for a single-node route; a merged
        // multi-node stream has no global ordering and callers re-sort.
        let pushed_order: Vec<(String, bool)> = if multi {
            Vec::new()
        } else {
            select
                .order_by
                .iter()
                .map(|o| (select.select_list[o.select_index].expr.to_sql(), o.ascending))
                .collect()
        };

        let targets = authoritative.group(session.merge_union_pushdown);

        let mut workers = Vec::with_capacity(targets.len());
        let mut descriptions = Vec::with_capacity(targets.len());
        for target in targets {
            let consistency = Self::consistency_maps(&filters, authoritative_idx, &target)?;
            let plan = SelectPushdown {
                items: pushed_items.clone(),
                filters: filters.clone(),
                group_by: pushed_group_by.clone(),
                order_by: pushed_order.clone(),
                limit: pushed_limit,
                offset: pushed_offset,
                distinct: select.distinct,
                for_update: select.for_update,
            };
            let sql = factory.translator().select(&plan, &consistency)?;
            let worker = factory.query_worker(target, sql);
            descriptions.push(worker.describe());
            workers.push(worker);
        }

        tracing::debug!(
            workers = workers.len(),
            multi,
            grouped,
            "direct-lookup prepared"
        );

        Ok(Self {
            select,
            workers,
            descriptions,
            client_columns,
            client_offset,
            client_limit,
            merge_plan,
            always_false: false,
            inner: None,
        })
    }

    /// For every member node of a target, map each filter alias to the
    /// member's shard-consistent physical node, so multi-table push-down
    /// SQL joins the right physical tables on that node.
    fn consistency_maps(
        filters: &[&TableFilter],
        authoritative_idx: usize,
        target: &RouteNode,
    ) -> ShrikeResult<Vec<HashMap<String, ObjectNode>>> {
        let authoritative_rule = &filters[authoritative_idx]
            .table_mate()
            .ok_or(RoutingError::NoCandidateRoute)?
            .rule;

        let mut maps = Vec::new();
        for member in target.object_nodes() {
            // Partition index of this member within the authoritative rule,
            // used to localize other sharded filters of the same owner
            // group (identical layouts by comparability).
            let index_hint = authoritative_rule
                .all_nodes()
                .iter()
                .position(|n| n == member);

            let mut map = HashMap::with_capacity(filters.len());
            for filter in filters {
                let mate = filter
                    .table_mate()
                    .ok_or(RoutingError::NoCandidateRoute)?;
                let node = Self::consistent_node(mate, &member.shard_name, index_hint)?;
                map.insert(filter.alias.clone(), node);
            }
            maps.push(map);
        }
        Ok(maps)
    }

    fn consistent_node(
        mate: &TableMate,
        shard: &str,
        index_hint: Option<usize>,
    ) -> ShrikeResult<ObjectNode> {
        match &mate.rule {
            TableRule::Fixed(r) => Ok(r.node.clone()),
            TableRule::Global(r) => r
                .broadcasts
                .iter()
                .find(|n| n.shard_name == shard)
                .cloned()
                .ok_or_else(|| {
                    RoutingError::NoNodesSelected {
                        table: mate.name.clone(),
                    }
                    .into()
                }),
            TableRule::Sharded(r) => match index_hint {
                Some(i) if i < r.nodes.len() => Ok(r.nodes[i].clone()),
                _ => r
                    .nodes
                    .iter()
                    .find(|n| n.shard_name == shard)
                    .cloned()
                    .ok_or_else(|| {
                        RoutingError::NoNodesSelected {
                            table: mate.name.clone(),
                        }
                        .into()
                    }),
            },
        }
    }

    /// Fan out the prepared workers and assemble the client-side stack.
    pub fn execute(&mut self, session: &Session) -> ShrikeResult<()> {
        if self.always_false {
            self.inner = Some(Box::new(MemoryCursor::empty(self.client_columns.clone())));
            return Ok(());
        }
        let workers = std::mem::take(&mut self.workers);
        let mut cursor = invoke_query_workers(session, workers)?;

        if let Some(plan) = self.merge_plan.take() {
            let merged = AggregateMergeCursor::new(cursor, plan.merges.clone())?;
            cursor = Box::new(ProjectionCursor {
                inner: Box::new(merged),
                columns: self.client_columns.clone(),
                items: self.select.select_list.iter().map(|i| i.expr.clone()).collect(),
                slots: plan.slots,
            });
        }
        if self.client_offset > 0 || self.client_limit.is_some() {
            cursor = Box::new(OffsetCursor::new(
                cursor,
                self.client_offset,
                self.client_limit,
            ));
        }
        self.inner = Some(cursor);
        Ok(())
    }

    pub fn explain(&self) -> String {
        explain_workers(&self.descriptions)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Cursor for DirectLookupCursor {
    fn columns(&self) -> &[String] {
        &self.client_columns
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        match &mut self.inner {
            Some(inner) => inner.next(),
            None => Err(shrike_common::error::ShrikeError::Internal(
                "direct-lookup cursor read before execute".into(),
            )),
        }
    }
}
