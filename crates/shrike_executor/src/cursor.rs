//! Client-visible cursors and the merge machinery layered over per-node
//! worker results.

use std::collections::VecDeque;

use shrike_common::datum::{Datum, Row};
use shrike_common::error::ShrikeResult;

/// A forward-only result cursor.
pub trait Cursor: Send {
    fn columns(&self) -> &[String];
    fn next(&mut self) -> ShrikeResult<Option<Row>>;
}

/// Materialized rows, used for single-node worker results and post-merge
/// output.
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl MemoryCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }
}

impl Cursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Visits each underlying cursor's rows in worker-submission order,
/// exhausting one before advancing to the next. No cross-node interleaving
/// or global ordering: callers needing a global ORDER BY re-sort after
/// draining.
pub struct MergedCursor {
    columns: Vec<String>,
    inners: VecDeque<Box<dyn Cursor>>,
}

impl MergedCursor {
    pub fn new(inners: Vec<Box<dyn Cursor>>) -> Self {
        let columns = inners
            .first()
            .map(|c| c.columns().to_vec())
            .unwrap_or_default();
        Self {
            columns,
            inners: inners.into(),
        }
    }
}

impl Cursor for MergedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        while let Some(front) = self.inners.front_mut() {
            match front.next()? {
                Some(row) => return Ok(Some(row)),
                None => {
                    self.inners.pop_front();
                }
            }
        }
        Ok(None)
    }
}

/// Skips the true OFFSET client-side after a multi-node merge, row by row.
/// The per-node queries were pushed with `LIMIT limit+offset OFFSET 0`,
/// since OFFSET is only meaningful against a single ordered stream.
pub struct OffsetCursor {
    inner: Box<dyn Cursor>,
    to_skip: usize,
    limit: Option<u64>,
    yielded: u64,
}

impl OffsetCursor {
    pub fn new(inner: Box<dyn Cursor>, offset: usize, limit: Option<u64>) -> Self {
        Self {
            inner,
            to_skip: offset,
            limit,
            yielded: 0,
        }
    }
}

impl Cursor for OffsetCursor {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        while self.to_skip > 0 {
            if self.inner.next()?.is_none() {
                self.to_skip = 0;
                return Ok(None);
            }
            self.to_skip -= 1;
        }
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                return Ok(None);
            }
        }
        let row = self.inner.next()?;
        if row.is_some() {
            self.yielded += 1;
        }
        Ok(row)
    }
}

// ── group-by re-aggregation ──────────────────────────────────────────────────

/// Per-column merge rule for two-phase aggregation: each node computed a
/// partial aggregate; the union of partials is re-aggregated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggMerge {
    /// Grouping key column: defines the merge key.
    Group,
    /// Partial COUNT/SUM columns merge by addition.
    Sum,
    Min,
    Max,
}

fn add_datums(a: &Datum, b: &Datum) -> Datum {
    match (a, b) {
        (Datum::Null, other) | (other, Datum::Null) => other.clone(),
        (Datum::Int64(x), Datum::Int64(y)) => Datum::Int64(x + y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Datum::Float64(x + y),
            _ => a.clone(),
        },
    }
}

/// Re-runs grouped aggregation over the unioned per-node rows. Eagerly
/// drains the input at construction; group output order follows first
/// appearance in the merged stream.
pub struct AggregateMergeCursor {
    output: MemoryCursor,
}

impl AggregateMergeCursor {
    pub fn new(mut inner: Box<dyn Cursor>, merges: Vec<AggMerge>) -> ShrikeResult<Self> {
        let columns = inner.columns().to_vec();
        let key_indices: Vec<usize> = merges
            .iter()
            .enumerate()
            .filter(|(_, m)| matches!(m, AggMerge::Group))
            .map(|(i, _)| i)
            .collect();

        let mut order: Vec<Row> = Vec::new();
        let mut groups: Vec<(Vec<Datum>, usize)> = Vec::new();
        while let Some(row) = inner.next()? {
            let key: Vec<Datum> = key_indices.iter().map(|&i| row[i].clone()).collect();
            match groups.iter().find(|(k, _)| *k == key) {
                Some(&(_, slot)) => {
                    let acc = &mut order[slot];
                    for (i, merge) in merges.iter().enumerate() {
                        match merge {
                            AggMerge::Group => {}
                            AggMerge::Sum => acc[i] = add_datums(&acc[i], &row[i]),
                            // SQL MIN/MAX ignore NULL partials.
                            AggMerge::Min => {
                                if !row[i].is_null() && (acc[i].is_null() || row[i] < acc[i]) {
                                    acc[i] = row[i].clone();
                                }
                            }
                            AggMerge::Max => {
                                if !row[i].is_null() && (acc[i].is_null() || row[i] > acc[i]) {
                                    acc[i] = row[i].clone();
                                }
                            }
                        }
                    }
                }
                None => {
                    groups.push((key, order.len()));
                    order.push(row);
                }
            }
        }

        // A grouped query with no group columns (global aggregate) must
        // still produce one row even when every node came back empty.
        if order.is_empty() && key_indices.is_empty() && !merges.is_empty() {
            let row: Row = merges
                .iter()
                .map(|m| match m {
                    AggMerge::Sum => Datum::Int64(0),
                    _ => Datum::Null,
                })
                .collect();
            order.push(row);
        }

        Ok(Self {
            output: MemoryCursor::new(columns, order),
        })
    }
}

impl Cursor for AggregateMergeCursor {
    fn columns(&self) -> &[String] {
        self.output.columns()
    }

    fn next(&mut self) -> ShrikeResult<Option<Row>> {
        self.output.next()
    }
}

/// Drain a cursor into memory.
pub fn drain(cursor: &mut dyn Cursor) -> ShrikeResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        rows.push(row);
    }
    Ok(rows)
}
