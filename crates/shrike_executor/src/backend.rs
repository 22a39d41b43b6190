//! The physical-database boundary. Connection pooling and the MySQL client
//! protocol live behind this trait; tests inject a scripted in-memory fake.

use shrike_common::datum::Row;
use shrike_common::error::ShrikeResult;
use shrike_router::table::ColumnMeta;

use crate::translate::TranslatedSql;

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// One executed statement against one shard. Implementations pick a
/// concrete member connection (read/write split, weights) internally.
pub trait Backend: Send + Sync {
    fn execute_update(&self, shard: &str, sql: &TranslatedSql) -> ShrikeResult<u64>;

    fn execute_query(&self, shard: &str, sql: &TranslatedSql) -> ShrikeResult<QueryResult>;

    /// Authoritative schema introspection, used against a rule's metadata
    /// node after DDL.
    fn describe_table(&self, shard: &str, table: &str) -> ShrikeResult<Vec<ColumnMeta>>;
}
