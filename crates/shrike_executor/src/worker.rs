//! Bound units of work: one translated statement against one destination.
//! Stateless beyond a single invocation; disposable after collection.

use std::sync::Arc;

use shrike_common::error::{ExecError, ShrikeResult};
use shrike_router::object_node::RouteNode;

use crate::backend::{Backend, QueryResult};
use crate::translate::{SqlTranslator, TranslatedSql};

pub struct UpdateWorker {
    pub target: RouteNode,
    pub sql: TranslatedSql,
    backend: Arc<dyn Backend>,
}

impl UpdateWorker {
    pub fn run(&self) -> ShrikeResult<u64> {
        self.backend
            .execute_update(self.target.shard_name(), &self.sql)
            .map_err(|e| {
                ExecError::WorkerFailed {
                    node: self.target.to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }

    pub fn describe(&self) -> String {
        format!("{} :: {}", self.target, self.sql.text)
    }
}

/// Many translated statements against one destination, executed on a single
/// pool slot. Bounds thread-pool pressure under high insert fan-out.
pub struct BatchUpdateWorker {
    pub target: RouteNode,
    pub statements: Vec<TranslatedSql>,
    backend: Arc<dyn Backend>,
}

impl BatchUpdateWorker {
    pub fn run(&self) -> ShrikeResult<u64> {
        let mut total = 0u64;
        for sql in &self.statements {
            total += self
                .backend
                .execute_update(self.target.shard_name(), sql)
                .map_err(|e| ExecError::WorkerFailed {
                    node: self.target.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(total)
    }

    pub fn describe(&self) -> String {
        format!("{} :: batch[{}]", self.target, self.statements.len())
    }
}

pub struct QueryWorker {
    pub target: RouteNode,
    pub sql: TranslatedSql,
    backend: Arc<dyn Backend>,
}

impl QueryWorker {
    pub fn run(&self) -> ShrikeResult<QueryResult> {
        self.backend
            .execute_query(self.target.shard_name(), &self.sql)
            .map_err(|e| {
                ExecError::WorkerFailed {
                    node: self.target.to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }

    pub fn describe(&self) -> String {
        format!("{} :: {}", self.target, self.sql.text)
    }
}

/// Injected into every executor: binds workers to the physical backend and
/// carries the dialect translator.
#[derive(Clone)]
pub struct WorkerFactory {
    backend: Arc<dyn Backend>,
    translator: Arc<dyn SqlTranslator>,
}

impl WorkerFactory {
    pub fn new(backend: Arc<dyn Backend>, translator: Arc<dyn SqlTranslator>) -> Self {
        Self {
            backend,
            translator,
        }
    }

    pub fn translator(&self) -> &dyn SqlTranslator {
        self.translator.as_ref()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn update_worker(&self, target: RouteNode, sql: TranslatedSql) -> UpdateWorker {
        UpdateWorker {
            target,
            sql,
            backend: self.backend.clone(),
        }
    }

    pub fn batch_worker(&self, target: RouteNode, statements: Vec<TranslatedSql>) -> BatchUpdateWorker {
        BatchUpdateWorker {
            target,
            statements,
            backend: self.backend.clone(),
        }
    }

    pub fn query_worker(&self, target: RouteNode, sql: TranslatedSql) -> QueryWorker {
        QueryWorker {
            target,
            sql,
            backend: self.backend.clone(),
        }
    }
}
