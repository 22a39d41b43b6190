//! Distributed execution core: compiles prepared statements into per-node
//! workers, fans them out on a bounded pool under a shared deadline, and
//! merges the results back into one client-visible answer.

pub mod backend;
pub mod cursor;
pub mod direct_lookup;
pub mod executors;
pub mod expr;
pub mod framework;
pub mod pool;
pub mod session;
pub mod statement;
pub mod translate;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, QueryResult};
pub use cursor::{AggMerge, AggregateMergeCursor, Cursor, MemoryCursor, MergedCursor, OffsetCursor};
pub use direct_lookup::{DirectLookupCursor, DirectLookupEstimator};
pub use executors::{
    CreateIndexExecutor, CreateTableExecutor, DeleteExecutor, DropTableExecutor, InsertExecutor,
    SelectExecutor, UpdateExecutor,
};
pub use expr::{AggFunc, BinOp, Expr};
pub use framework::{
    explain_workers, invoke_query_workers, invoke_update_workers, AnyUpdateWorker, Executor,
};
pub use pool::WorkerPool;
pub use session::{FanoutStats, Session};
pub use statement::{
    CreateIndexStatement, CreateTableStatement, DeleteStatement, DropTableStatement,
    InsertSource, InsertStatement, OrderItem, SelectItem, SelectStatement, UpdateStatement,
};
pub use translate::{MySqlTranslator, SelectPushdown, SqlTranslator, TranslatedSql};
pub use worker::{BatchUpdateWorker, QueryWorker, UpdateWorker, WorkerFactory};
