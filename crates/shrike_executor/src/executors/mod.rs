//! Per-statement executors: resolve the target table, compute the routing
//! result, bind one worker per destination, fan out, and aggregate.

pub mod ddl;
pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

pub use ddl::{CreateIndexExecutor, CreateTableExecutor, DropTableExecutor};
pub use delete::DeleteExecutor;
pub use insert::InsertExecutor;
pub use select::SelectExecutor;
pub use update::UpdateExecutor;
