//! Scripted in-memory backend and fixture helpers shared by the executor
//! tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use shrike_common::config::ServerConfig;
use shrike_common::datum::Row;
use shrike_common::error::ShrikeResult;
use shrike_router::object_node::ObjectNode;
use shrike_router::partition::{ModPartitioner, PartitionAlgorithm};
use shrike_router::rule::TableRule;
use shrike_router::table::{ColumnMeta, TableMate};

use crate::backend::{Backend, QueryResult};
use crate::pool::WorkerPool;
use crate::session::Session;
use crate::translate::{MySqlTranslator, TranslatedSql};
use crate::worker::WorkerFactory;

/// Records every statement it receives and replays scripted results.
/// Unscripted updates default to 1 affected row per inserted tuple (or per
/// statement), unscripted queries to an empty result.
#[derive(Default)]
pub struct MockBackend {
    pub calls: Mutex<Vec<(String, TranslatedSql)>>,
    update_scripts: Mutex<HashMap<String, VecDeque<ShrikeResult<u64>>>>,
    query_scripts: Mutex<HashMap<String, VecDeque<QueryResult>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_update(&self, shard: &str, result: ShrikeResult<u64>) {
        self.update_scripts
            .lock()
            .entry(shard.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn script_query(&self, shard: &str, columns: &[&str], rows: Vec<Row>) {
        self.query_scripts
            .lock()
            .entry(shard.to_string())
            .or_default()
            .push_back(QueryResult {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            });
    }

    pub fn calls_for(&self, shard: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| s == shard)
            .map(|(_, sql)| sql.text.clone())
            .collect()
    }

    pub fn all_calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .map(|(s, sql)| (s.clone(), sql.text.clone()))
            .collect()
    }
}

impl Backend for MockBackend {
    fn execute_update(&self, shard: &str, sql: &TranslatedSql) -> ShrikeResult<u64> {
        self.calls.lock().push((shard.to_string(), sql.clone()));
        if let Some(script) = self.update_scripts.lock().get_mut(shard) {
            if let Some(result) = script.pop_front() {
                return result;
            }
        }
        if sql.text.starts_with("INSERT") {
            // One affected row per pushed tuple.
            return Ok(sql.text.matches("(?").count().max(1) as u64);
        }
        if sql.text.starts_with("CREATE") || sql.text.starts_with("DROP") {
            return Ok(0);
        }
        Ok(1)
    }

    fn execute_query(&self, shard: &str, sql: &TranslatedSql) -> ShrikeResult<QueryResult> {
        self.calls.lock().push((shard.to_string(), sql.clone()));
        if let Some(script) = self.query_scripts.lock().get_mut(shard) {
            if let Some(result) = script.pop_front() {
                return Ok(result);
            }
        }
        Ok(QueryResult::default())
    }

    fn describe_table(&self, shard: &str, table: &str) -> ShrikeResult<Vec<ColumnMeta>> {
        let _ = (shard, table);
        Ok(vec![ColumnMeta::new("id", "BIGINT")])
    }
}

pub fn test_session(timeout_ms: u64) -> Session {
    let cfg = ServerConfig {
        query_timeout_ms: timeout_ms,
        insert_worker_limit: 8,
        insert_flush_rows: 4,
        ..ServerConfig::default()
    };
    let session = Session::new(Arc::new(WorkerPool::new(4, 64)), &cfg);
    session.begin_statement();
    session
}

pub fn factory(backend: Arc<dyn Backend>) -> WorkerFactory {
    WorkerFactory::new(backend, Arc::new(MySqlTranslator))
}

/// `orders`-style sharded table: N nodes `s0..sN`, suffixes `0000..`,
/// mod-N on the given column, sharing the supplied algorithm instance.
pub fn sharded_mate(
    name: &str,
    column: &str,
    shards: usize,
    algorithm: &Arc<PartitionAlgorithm>,
) -> Arc<TableMate> {
    let nodes = (0..shards)
        .map(|i| ObjectNode::new(format!("s{}", i), name).with_suffix(format!("{:04}", i)))
        .collect();
    Arc::new(TableMate::new(
        name,
        vec![
            ColumnMeta::new("id", "BIGINT"),
            ColumnMeta::new(column, "BIGINT"),
        ],
        TableRule::sharded(nodes, vec![column.to_string()], "mod", algorithm.clone()),
    ))
}

pub fn mod_algorithm(partitions: usize) -> Arc<PartitionAlgorithm> {
    Arc::new(PartitionAlgorithm::Single(Box::new(ModPartitioner::new(
        partitions,
    ))))
}

pub fn global_mate(name: &str, shards: usize) -> Arc<TableMate> {
    let nodes = (0..shards)
        .map(|i| ObjectNode::new(format!("s{}", i), name))
        .collect();
    Arc::new(TableMate::new(
        name,
        vec![ColumnMeta::new("id", "BIGINT")],
        TableRule::global(nodes),
    ))
}
