//! Resolves the parsed configuration into live table metadata: nodes,
//! rules, and partition algorithm instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use shrike_common::config::{NodeSpec, ShrikeConfig, TableKind, TableRuleConfig};
use shrike_common::error::{ShrikeError, ShrikeResult};

use crate::object_node::ObjectNode;
use crate::partition::{PartitionAlgorithm, PartitionerRegistry};
use crate::rule::TableRule;
use crate::table::TableMate;

fn object_node(logical: &str, spec: &NodeSpec) -> ObjectNode {
    ObjectNode {
        shard_name: spec.shard.clone(),
        catalog: spec.catalog.clone(),
        schema: spec.schema.clone(),
        object_name: spec.table.clone().unwrap_or_else(|| logical.to_string()),
        suffix: spec.suffix.clone(),
    }
}

/// Tables configured with the same algorithm, properties, and shard layout
/// share one algorithm instance; sharing is what makes them one
/// partition-owner group for co-located join detection.
fn owner_group_key(table: &TableRuleConfig) -> String {
    let shards: Vec<&str> = table.nodes.iter().map(|n| n.shard.as_str()).collect();
    format!(
        "{}|{:?}|{}",
        table.algorithm,
        table.properties,
        shards.join(",")
    )
}

/// Build the logical-name → [`TableMate`] map from configuration, resolving
/// every partition algorithm against the registry at load time.
pub fn build_tables(
    cfg: &ShrikeConfig,
    registry: &PartitionerRegistry,
) -> ShrikeResult<BTreeMap<String, Arc<TableMate>>> {
    let mut algorithms: BTreeMap<String, Arc<PartitionAlgorithm>> = BTreeMap::new();
    let mut tables = BTreeMap::new();

    for table in &cfg.tables {
        let nodes: Vec<ObjectNode> = table
            .nodes
            .iter()
            .map(|spec| object_node(&table.name, spec))
            .collect();

        let rule = match table.kind {
            TableKind::Fixed => TableRule::fixed(nodes.into_iter().next().expect("validated")),
            TableKind::Global => TableRule::global(nodes),
            TableKind::Sharded => {
                let key = owner_group_key(table);
                let algorithm = match algorithms.get(&key) {
                    Some(existing) => existing.clone(),
                    None => {
                        let built = registry
                            .build(&table.algorithm, &table.properties)
                            .map_err(ShrikeError::from)?;
                        let arc = Arc::new(built);
                        algorithms.insert(key, arc.clone());
                        arc
                    }
                };
                TableRule::sharded(nodes, table.rule_columns.clone(), &table.algorithm, algorithm)
            }
        };

        tracing::debug!(
            table = table.name.as_str(),
            nodes = rule.all_nodes().len(),
            "table rule built"
        );
        tables.insert(
            table.name.clone(),
            Arc::new(TableMate::new(&table.name, Vec::new(), rule)),
        );
    }
    Ok(tables)
}
