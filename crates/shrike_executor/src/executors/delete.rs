use shrike_common::error::ShrikeResult;
use shrike_router::handler::RoutingHandler;
use shrike_router::object_node::RouteNode;

use crate::framework::{explain_workers, invoke_update_workers, AnyUpdateWorker, Executor};
use crate::session::Session;
use crate::statement::DeleteStatement;
use crate::worker::WorkerFactory;

pub struct DeleteExecutor {
    stmt: DeleteStatement,
    factory: WorkerFactory,
    workers: Vec<AnyUpdateWorker>,
    descriptions: Vec<String>,
    prepared: bool,
}

impl DeleteExecutor {
    pub fn new(stmt: DeleteStatement, factory: WorkerFactory) -> Self {
        Self {
            stmt,
            factory,
            workers: Vec::new(),
            descriptions: Vec::new(),
            prepared: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn prepare(&mut self, _session: &Session) -> ShrikeResult<()> {
        if self.prepared {
            return Ok(());
        }
        let route = RoutingHandler::route_write(&self.stmt.table, &self.stmt.filter)?;
        for node in route.selected() {
            let sql = self.factory.translator().delete(&self.stmt, node);
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
        if self.workers.is_empty() {
            return Ok(0);
        }
        invoke_update_workers(session, std::mem::take(&mut self.workers))
    }

    fn explain(&self, session: &Session) -> ShrikeResult<String> {
        let _ = session;
        Ok(explain_workers(&self.descriptions))
    }
}
