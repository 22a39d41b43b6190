//! DDL executors: unconditional broadcast per the table rule, with
//! metadata introspection against the rule's designated node afterwards.

use shrike_common::error::ShrikeResult;
use shrike_router::handler::RoutingHandler;
use shrike_router::object_node::RouteNode;
use shrike_router::table::ColumnMeta;

use crate::framework::{explain_workers, invoke_update_workers, AnyUpdateWorker, Executor};
use crate::session::Session;
use crate::statement::{CreateIndexStatement, CreateTableStatement, DropTableStatement};
use crate::worker::WorkerFactory;

pub struct CreateTableExecutor {
    stmt: CreateTableStatement,
    factory: WorkerFactory,
    workers: Vec<AnyUpdateWorker>,
    descriptions: Vec<String>,
    loaded_columns: Vec<ColumnMeta>,
    prepared: bool,
}

impl CreateTableExecutor {
    pub fn new(stmt: CreateTableStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            workers: Vec::new(),
            descriptions: Vec::new(),
            loaded_columns: Vec::new(),
            prepared: false,
        }
    }

    /// Authoritative column metadata fetched from the metadata node after a
    /// successful broadcast; the catalog layer stores it on the table.
    pub fn loaded_columns(&self) -> &[ColumnMeta] {
        &self.loaded_columns
    }
}

impl Executor for CreateTableExecutor {
    fn prepare(&mut self, _session: &Session) -> ShrikeResult<()> {
        if self.prepared {
            return Ok(());
        }
        let route = RoutingHandler::route_unconditional(&self.stmt.table);
        for node in route.selected() {
            let sql = self.factory.translator().create_table(&self.stmt, node);
            let worker = self
                .factory
                .update_worker(RouteNode::Single(node.clone()), sql);
            self.descriptions.push(worker.describe());
            self.workers.push(worker.into());
        }
        self.prepared = true;
        Ok(())
    }

    fn update(&mut self, session: &Session) -> ShrikeResult<u64> {
        self.prepare(session)?;
        let count = invoke_update_workers(session, std::mem::take(&mut self.workers))?;
        // All nodes of the table are schema-identical; one node answers for
        // the whole rule.
        let meta_node = self.stmt.table.metadata_node();
        self.loaded_columns = self
            .factory
            .backend()
            .describe_table(&meta_node.shard_name, &meta_node.qualified_table())?;
        Ok(count)
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        let _ = session;
        Ok(explain_workers(&self.descriptions))
    }
}

pub struct CreateIndexExecutor {
    stmt: CreateIndexStatement,
    factory: WorkerFactory,
    workers: Vec<AnyUpdateWorker>,
    descriptions: Vec<String>,
    prepared: bool,
}

impl CreateIndexExecutor {
    pub fn new(stmt: CreateIndexStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            workers: Vec::new(),
            descriptions: Vec::new(),
            prepared: false,
        }
    }
}

impl Executor for CreateIndexExecutor {
    fn prepare(&mut self, _session: &Session) -> ShrikeResult<()> {
        if self.prepared {
            return Ok(());
        }
        let route = RoutingHandler::route_unconditional(&self.stmt.table);
        for node in route.selected() {
            let sql = self.factory.translator().create_index(&self.stmt, node);
            let worker = self
                .factory
                .update_worker(RouteNode::Single(node.clone()), sql);
            self.descriptions.push(worker.describe());
            self.workers.push(worker.into());
        }
        self.prepared = true;
        Ok(())
    }

    fn update(&mut self, session: &Session) -> ShrikeResult<u64> {
        self.prepare(session)?;
        invoke_update_workers(session, std::mem::take(&mut self.workers))
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        let _ = session;
        Ok(explain_workers(&self.descriptions))
    }
}

pub struct DropTableExecutor {
    stmt: DropTableStatement,
    factory: WorkerFactory,
    workers: Vec<AnyUpdateWorker>,
    descriptions: Vec<String>,
    prepared: bool,
}

impl DropTableExecutor {
    pub fn new(stmt: DropTableStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            workers: Vec::new(),
            descriptions: Vec::new(),
            prepared: false,
        }
    }
}

impl Executor for DropTableExecutor {
    fn prepare(&mut self, _session: &Session) -> ShrikeResult<()> {
        if self.prepared {
            return Ok(());
        }
        let route = RoutingHandler::route_unconditional(&self.stmt.table);
        for node in route.selected() {
            let sql = self.factory.translator().drop_table(&self.stmt, node);
            let worker = self
                .factory
                .update_worker(RouteNode::Single(node.clone()), sql);
            self.descriptions.push(worker.describe());
            self.workers.push(worker.into());
        }
        self.prepared = true;
        Ok(())
    }

    fn update(&mut self, session: &Session) -> ShrikeResult<u64> {
        self.prepare(session)?;
        invoke_update_workers(session, std::mem::take(&mut self.workers))
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        let _ = session;
        Ok(explain_workers(&self.descriptions))
    }
}
