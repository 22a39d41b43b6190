//! INSERT execution: row-bound routing, per-node consolidation above the
//! worker-count threshold, and buffered streaming for INSERT ... SELECT.

use shrike_common::datum::Row;
use shrike_common::error::{ShrikeResult, SqlError};
use shrike_router::handler::RoutingHandler;
use shrike_router::object_node::{ObjectNode, RouteNode};

use crate::framework::{explain_workers, invoke_update_workers, AnyUpdateWorker, Executor};
use crate::session::Session;
use crate::statement::{InsertSource, InsertStatement};
use crate::worker::WorkerFactory;

use super::select::SelectExecutor;

pub struct InsertExecutor {
    stmt: InsertStatement,
    factory: WorkerFactory,
    workers: Vec<AnyUpdateWorker>,
    descriptions: Vec<String>,
    inner_select: Option<Box<SelectExecutor>>,
    prepared: bool,
}

impl InsertExecutor {
    pub fn new(stmt: InsertStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            workers: Vec::new(),
            descriptions: Vec::new(),
            inner_select: None,
            prepared: false,
        }
    }

    /// Route every row and bucket it per destination node. A global-table
    /// row lands in every replica's bucket.
    fn group_rows(&self, rows: &[Row]) -> ShrikeResult<Vec<(ObjectNode, Vec<Row>)>> {
        let mut groups: Vec<(ObjectNode, Vec<Row>)> = Vec::new();
        for row in rows {
            if row.len() != self.stmt.columns.len() {
                return Err(SqlError::ColumnCountMismatch {
                    expected: self.stmt.columns.len(),
                    got: row.len(),
                }
                .into());
            }
            let route =
                RoutingHandler::route_for_row(&self.stmt.table, &self.stmt.columns, row)?;
            for node in route.selected() {
                match groups.iter_mut().find(|(n, _)| n == node) {
                    Some((_, bucket)) => bucket.push(row.clone()),
                    None => groups.push((node.clone(), vec![row.clone()])),
                }
            }
        }
        Ok(groups)
    }

    /// One worker per routed row, unless the fan-out would exceed the
    /// configured worker-count threshold — then rows are consolidated into
    /// one multi-row statement per destination node, bounding pool pressure
    /// under high insert volume.
    fn build_workers(
        &self,
        session: &Session,
        groups: Vec<(ObjectNode, Vec<Row>)>,
    ) -> Vec<AnyUpdateWorker> {
        let prospective: usize = groups.iter().map(|(_, rows)| rows.len()).sum();
        let consolidate = prospective > session.insert_worker_limit;
        let mut workers = Vec::new();
        for (node, rows) in groups {
            if consolidate {
                let sql = self
                    .factory
                    .translator()
                    .insert_rows(&self.stmt, &node, &rows);
                workers.push(
                    self.factory
                        .update_worker(RouteNode::Single(node), sql)
                        .into(),
                );
            } else {
                for row in &rows {
                    let sql = self.factory.translator().insert_rows(
                        &self.stmt,
                        &node,
                        std::slice::from_ref(row),
                    );
                    workers.push(
                        self.factory
                            .update_worker(RouteNode::Single(node.clone()), sql)
                            .into(),
                    );
                }
            }
        }
        workers
    }

    /// Stream rows out of the source cursor, flushing a consolidated batch
    /// per destination whenever the buffer reaches the configured row
    /// count. Bounds memory for INSERT ... SELECT over large result sets.
    fn stream_from_query(
        &mut self,
        session: &Session,
        mut select: Box<SelectExecutor>,
    ) -> ShrikeResult<u64> {
        let mut cursor = select.query(session)?;
        let mut buffer: Vec<Row> = Vec::with_capacity(session.insert_flush_rows);
        let mut total = 0u64;
        while let Some(row) = cursor.next()? {
            if row.len() != self.stmt.columns.len() {
                return Err(SqlError::ColumnCountMismatch {
                    expected: self.stmt.columns.len(),
                    got: row.len(),
                }
                .into());
            }
            buffer.push(row);
            if buffer.len() >= session.insert_flush_rows {
                total += self.flush(session, std::mem::take(&mut buffer))?;
            }
        }
        if !buffer.is_empty() {
            total += self.flush(session, buffer)?;
        }
        Ok(total)
    }

    fn flush(&self, session: &Session, rows: Vec<Row>) -> ShrikeResult<u64> {
        let groups = self.group_rows(&rows)?;
        let mut workers = Vec::with_capacity(groups.len());
        for (node, rows) in groups {
            let sql = self
                .factory
                .translator()
                .insert_rows(&self.stmt, &node, &rows);
            workers.push(
                self.factory
                    .update_worker(RouteNode::Single(node), sql)
                    .into(),
            );
        }
        tracing::debug!(rows = rows.len(), workers = workers.len(), "insert flush");
        invoke_update_workers(session, workers)
    }
}

impl Executor for InsertExecutor {
    fn prepare(&mut self, session: &Session) -> ShrikeResult<()> {
        if self.prepared {
            return Ok(());
        }
        match &self.stmt.source {
            InsertSource::Values(rows) => {
                let rows = rows.clone();
                let groups = self.group_rows(&rows)?;
                let workers = self.build_workers(session, groups);
                self.descriptions = workers.iter().map(|w| w.describe()).collect();
                self.workers = workers;
            }
            InsertSource::Query(select) => {
                if select.select_list.len() != self.stmt.columns.len() {
                    return Err(SqlError::ColumnCountMismatch {
                        expected: self.stmt.columns.len(),
                        got: select.select_list.len(),
                    }
                    .into());
                }
                let mut inner =
                    Box::new(SelectExecutor::new((**select).clone(), self.factory.clone()));
                inner.prepare(session)?;
                self.inner_select = Some(inner);
            }
        }
        self.prepared = true;
        Ok(())
    }

    fn update(&mut self, session: &Session) -> ShrikeResult<u64> {
        self.prepare(session)?;
        if let Some(select) = self.inner_select.take() {
            return self.stream_from_query(session, select);
        }
        if self.workers.is_empty() {
            return Ok(0);
        }
        invoke_update_workers(session, std::mem::take(&mut self.workers))
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        match &self.inner_select {
            Some(select) => Ok(format!("INSERT_FROM_QUERY\n{}", select.explain(session)?)),
            None => Ok(explain_workers(&self.descriptions)),
        }
    }
}
