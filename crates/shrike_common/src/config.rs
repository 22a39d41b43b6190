use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level middleware configuration (`shrike.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrikeConfig {
    pub server: ServerConfig,
    /// Physical shard list.
    #[serde(default, rename = "shard")]
    pub shards: Vec<ShardConfig>,
    /// Table routing rules.
    #[serde(default, rename = "table")]
    pub tables: Vec<TableRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// MySQL wire protocol listen address.
    pub listen_addr: String,
    /// Fan-out worker pool: fixed thread count.
    #[serde(default = "default_fanout_threads")]
    pub fanout_threads: usize,
    /// Fan-out worker pool: bounded queue depth. Submission blocks when full.
    #[serde(default = "default_fanout_queue_depth")]
    pub fanout_queue_depth: usize,
    /// Default statement timeout in milliseconds (0 = no timeout).
    #[serde(default)]
    pub query_timeout_ms: u64,
    /// Fold same-shard nodes into one UNION ALL push-down query.
    #[serde(default = "default_true")]
    pub merge_union_pushdown: bool,
    /// INSERT fan-out above this many workers is consolidated into
    /// per-node batch workers.
    #[serde(default = "default_insert_worker_limit")]
    pub insert_worker_limit: usize,
    /// INSERT ... SELECT buffered rows flushed to workers at this count.
    #[serde(default = "default_insert_flush_rows")]
    pub insert_flush_rows: usize,
}

fn default_fanout_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_fanout_queue_depth() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_insert_worker_limit() -> usize {
    8
}

fn default_insert_flush_rows() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4406".to_string(),
            fanout_threads: default_fanout_threads(),
            fanout_queue_depth: default_fanout_queue_depth(),
            query_timeout_ms: 0,
            merge_union_pushdown: true,
            insert_worker_limit: default_insert_worker_limit(),
            insert_flush_rows: default_insert_flush_rows(),
        }
    }
}

/// One physical shard: a named group of backend members with read/write
/// weights. The connection layer consumes the member URLs; routing only
/// cares about the shard name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub name: String,
    #[serde(default)]
    pub write_members: Vec<MemberConfig>,
    #[serde(default)]
    pub read_members: Vec<MemberConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Backend DSN, e.g. `mysql://user@host:3306/db`.
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Routing-rule kind for one logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Single physical location; predicates ignored.
    Fixed,
    /// Replicated to every listed shard; reads hit one replica, writes all.
    Global,
    /// Partitioned across nodes by a named partition algorithm.
    Sharded,
}

/// One table rule as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub name: String,
    pub kind: TableKind,
    /// Physical node list. Fixed tables use exactly one entry.
    pub nodes: Vec<NodeSpec>,
    /// Sharding columns, in rule order. Required for `kind = "sharded"`.
    #[serde(default)]
    pub rule_columns: Vec<String>,
    /// Partition algorithm name, resolved against the registry at load time.
    #[serde(default)]
    pub algorithm: String,
    /// Bean-style algorithm properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// One physical table location in a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub shard: String,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Physical table name; defaults to the logical name.
    #[serde(default)]
    pub table: Option<String>,
    /// Table-name suffix for per-partition physical tables (`orders_0007`).
    #[serde(default)]
    pub suffix: Option<String>,
}

impl ShrikeConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: ShrikeConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural validation: shard name uniqueness, node references,
    /// per-kind rule shape. Partition algorithms are resolved separately
    /// against the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut shard_names: HashSet<&str> = HashSet::new();
        for shard in &self.shards {
            if !shard_names.insert(shard.name.as_str()) {
                return Err(ConfigError::DuplicateShard(shard.name.clone()));
            }
        }

        let mut table_names: HashSet<&str> = HashSet::new();
        for table in &self.tables {
            if !table_names.insert(table.name.as_str()) {
                return Err(ConfigError::DuplicateTable(table.name.clone()));
            }
            if table.nodes.is_empty() {
                return Err(ConfigError::InvalidRule {
                    table: table.name.clone(),
                    reason: "at least one node is required".into(),
                });
            }
            for node in &table.nodes {
                if !shard_names.contains(node.shard.as_str()) {
                    return Err(ConfigError::UnknownShard {
                        table: table.name.clone(),
                        shard: node.shard.clone(),
                    });
                }
            }
            match table.kind {
                TableKind::Fixed if table.nodes.len() != 1 => {
                    return Err(ConfigError::InvalidRule {
                        table: table.name.clone(),
                        reason: format!(
                            "fixed table must name exactly one node, got {}",
                            table.nodes.len()
                        ),
                    });
                }
                TableKind::Sharded => {
                    if table.rule_columns.is_empty() {
                        return Err(ConfigError::InvalidRule {
                            table: table.name.clone(),
                            reason: "sharded table requires rule_columns".into(),
                        });
                    }
                    if table.algorithm.is_empty() {
                        return Err(ConfigError::InvalidRule {
                            table: table.name.clone(),
                            reason: "sharded table requires a partition algorithm".into(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen_addr = "0.0.0.0:4406"
        query_timeout_ms = 5000

        [[shard]]
        name = "s0"
        write_members = [{ url = "mysql://root@db0:3306/app" }]

        [[shard]]
        name = "s1"
        write_members = [{ url = "mysql://root@db1:3306/app" }]

        [[table]]
        name = "orders"
        kind = "sharded"
        rule_columns = ["customer_id"]
        algorithm = "mod"
        properties = { partitions = "2" }
        nodes = [
            { shard = "s0", suffix = "0000" },
            { shard = "s1", suffix = "0001" },
        ]

        [[table]]
        name = "currency_rates"
        kind = "global"
        nodes = [{ shard = "s0" }, { shard = "s1" }]
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = ShrikeConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.shards.len(), 2);
        assert_eq!(cfg.tables.len(), 2);
        assert_eq!(cfg.server.query_timeout_ms, 5000);
        assert!(cfg.server.merge_union_pushdown);
        let orders = &cfg.tables[0];
        assert_eq!(orders.kind, TableKind::Sharded);
        assert_eq!(orders.rule_columns, vec!["customer_id"]);
        assert_eq!(orders.properties.get("partitions").unwrap(), "2");
    }

    #[test]
    fn test_unknown_shard_rejected() {
        let bad = SAMPLE.replace("{ shard = \"s1\", suffix = \"0001\" }", "{ shard = \"s9\" }");
        let err = ShrikeConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownShard { .. }));
    }

    #[test]
    fn test_sharded_requires_algorithm() {
        let bad = SAMPLE.replace("algorithm = \"mod\"", "algorithm = \"\"");
        let err = ShrikeConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));
    }

    #[test]
    fn test_duplicate_shard_rejected() {
        let bad = SAMPLE.replace("name = \"s1\"", "name = \"s0\"");
        let err = ShrikeConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateShard(_)));
    }
}
