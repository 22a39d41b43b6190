//! Table routing rules: where a logical table physically lives.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::object_node::ObjectNode;
use crate::partition::PartitionAlgorithm;

/// Single physical location. Predicates are irrelevant to routing.
#[derive(Debug, Clone)]
pub struct FixedNodeRule {
    pub node: ObjectNode,
}

/// Broadcast table: replicated to every listed shard. Reads may hit any
/// replica; writes must hit all of them.
#[derive(Debug, Clone)]
pub struct GlobalNodeRule {
    pub broadcasts: Vec<ObjectNode>,
}

/// Partitioned table: node list + sharding columns + partition algorithm.
/// The algorithm is shared (`Arc`) between tables that were configured
/// against the same instance; such tables form one partition-owner group.
#[derive(Debug, Clone)]
pub struct ShardedNodeRule {
    pub nodes: Vec<ObjectNode>,
    pub rule_columns: Vec<String>,
    pub algorithm_name: String,
    pub algorithm: Arc<PartitionAlgorithm>,
}

#[derive(Debug, Clone)]
pub enum TableRule {
    Fixed(FixedNodeRule),
    Global(GlobalNodeRule),
    Sharded(ShardedNodeRule),
}

impl TableRule {
    pub fn fixed(node: ObjectNode) -> Self {
        TableRule::Fixed(FixedNodeRule { node })
    }

    pub fn global(broadcasts: Vec<ObjectNode>) -> Self {
        TableRule::Global(GlobalNodeRule { broadcasts })
    }

    pub fn sharded(
        nodes: Vec<ObjectNode>,
        rule_columns: Vec<String>,
        algorithm_name: impl Into<String>,
        algorithm: Arc<PartitionAlgorithm>,
    ) -> Self {
        TableRule::Sharded(ShardedNodeRule {
            nodes,
            rule_columns,
            algorithm_name: algorithm_name.into(),
            algorithm,
        })
    }

    /// Every physical node this rule can route to.
    pub fn all_nodes(&self) -> &[ObjectNode] {
        match self {
            TableRule::Fixed(r) => std::slice::from_ref(&r.node),
            TableRule::Global(r) => &r.broadcasts,
            TableRule::Sharded(r) => &r.nodes,
        }
    }

    /// The node used to fetch authoritative schema metadata. All nodes of a
    /// sharded/global table are assumed schema-identical, so the first node
    /// is the designated source.
    pub fn metadata_node(&self) -> &ObjectNode {
        match self {
            TableRule::Fixed(r) => &r.node,
            TableRule::Global(r) => &r.broadcasts[0],
            TableRule::Sharded(r) => &r.nodes[0],
        }
    }

    pub fn rule_columns(&self) -> &[String] {
        match self {
            TableRule::Sharded(r) => &r.rule_columns,
            _ => &[],
        }
    }

    pub fn is_sharded(&self) -> bool {
        matches!(self, TableRule::Sharded(_))
    }

    pub fn is_global(&self) -> bool {
        matches!(self, TableRule::Global(_))
    }

    fn shard_set(&self) -> BTreeSet<&str> {
        self.all_nodes()
            .iter()
            .map(|n| n.shard_name.as_str())
            .collect()
    }

    /// Whether two rules guarantee compatible node sets under **any**
    /// predicate, making a join between their tables answerable locally on
    /// every selected node:
    ///
    /// - fixed / fixed: same shard;
    /// - global / global: same broadcast shard set;
    /// - sharded / sharded: same node list and the same algorithm instance
    ///   (one partition-owner group);
    /// - global / anything: the broadcast set covers every shard the other
    ///   table can route to;
    /// - fixed / sharded: only if the sharded table lives entirely on the
    ///   fixed table's shard.
    pub fn node_comparable(&self, other: &TableRule) -> bool {
        use TableRule::*;
        match (self, other) {
            (Fixed(a), Fixed(b)) => a.node.shard_name == b.node.shard_name,
            (Global(a), Global(b)) => {
                let sa: BTreeSet<&str> = a.broadcasts.iter().map(|n| n.shard_name.as_str()).collect();
                let sb: BTreeSet<&str> = b.broadcasts.iter().map(|n| n.shard_name.as_str()).collect();
                sa == sb
            }
            (Sharded(a), Sharded(b)) => {
                Arc::ptr_eq(&a.algorithm, &b.algorithm)
                    && a.nodes.len() == b.nodes.len()
                    && a.nodes
                        .iter()
                        .zip(&b.nodes)
                        .all(|(x, y)| x.shard_name == y.shard_name)
            }
            (Global(g), other_rule) | (other_rule, Global(g)) => {
                let gset: BTreeSet<&str> = g.broadcasts.iter().map(|n| n.shard_name.as_str()).collect();
                other_rule.shard_set().is_subset(&gset)
            }
            (Fixed(f), Sharded(s)) | (Sharded(s), Fixed(f)) => s
                .nodes
                .iter()
                .all(|n| n.shard_name == f.node.shard_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{ModPartitioner, PartitionAlgorithm};

    fn nodes(specs: &[(&str, &str)]) -> Vec<ObjectNode> {
        specs
            .iter()
            .map(|(shard, suffix)| ObjectNode::new(*shard, "t").with_suffix(*suffix))
            .collect()
    }

    fn mod_algorithm(n: usize) -> Arc<PartitionAlgorithm> {
        Arc::new(PartitionAlgorithm::Single(Box::new(ModPartitioner::new(n))))
    }

    #[test]
    fn test_metadata_node_is_first() {
        let rule = TableRule::global(nodes(&[("s0", "a"), ("s1", "b")]));
        assert_eq!(rule.metadata_node().shard_name, "s0");
    }

    // ── node comparability ───────────────────────────────────────────────

    #[test]
    fn test_fixed_fixed_same_shard() {
        let a = TableRule::fixed(ObjectNode::new("s0", "a"));
        let b = TableRule::fixed(ObjectNode::new("s0", "b"));
        let c = TableRule::fixed(ObjectNode::new("s1", "c"));
        assert!(a.node_comparable(&b));
        assert!(!a.node_comparable(&c));
    }

    #[test]
    fn test_global_global_same_broadcast_set() {
        let a = TableRule::global(nodes(&[("s0", "a"), ("s1", "a")]));
        let b = TableRule::global(nodes(&[("s1", "b"), ("s0", "b")]));
        let c = TableRule::global(nodes(&[("s0", "c")]));
        assert!(a.node_comparable(&b));
        assert!(!a.node_comparable(&c));
    }

    #[test]
    fn test_sharded_sharded_requires_shared_algorithm_instance() {
        let alg = mod_algorithm(2);
        let a = TableRule::sharded(
            nodes(&[("s0", "0"), ("s1", "1")]),
            vec!["id".into()],
            "mod",
            alg.clone(),
        );
        let b = TableRule::sharded(
            nodes(&[("s0", "0"), ("s1", "1")]),
            vec!["order_id".into()],
            "mod",
            alg,
        );
        // Same layout, different algorithm instance → different owner group.
        let c = TableRule::sharded(
            nodes(&[("s0", "0"), ("s1", "1")]),
            vec!["id".into()],
            "mod",
            mod_algorithm(2),
        );
        assert!(a.node_comparable(&b));
        assert!(!a.node_comparable(&c));
    }

    #[test]
    fn test_global_covers_sharded() {
        let sharded = TableRule::sharded(
            nodes(&[("s0", "0"), ("s1", "1")]),
            vec!["id".into()],
            "mod",
            mod_algorithm(2),
        );
        let covering = TableRule::global(nodes(&[("s0", "g"), ("s1", "g"), ("s2", "g")]));
        let partial = TableRule::global(nodes(&[("s0", "g")]));
        assert!(sharded.node_comparable(&covering));
        assert!(!sharded.node_comparable(&partial));
    }

    #[test]
    fn test_fixed_sharded_only_when_colocated() {
        let fixed = TableRule::fixed(ObjectNode::new("s0", "f"));
        let colocated = TableRule::sharded(
            nodes(&[("s0", "0"), ("s0", "1")]),
            vec!["id".into()],
            "mod",
            mod_algorithm(2),
        );
        let spread = TableRule::sharded(
            nodes(&[("s0", "0"), ("s1", "1")]),
            vec!["id".into()],
            "mod",
            mod_algorithm(2),
        );
        assert!(fixed.node_comparable(&colocated));
        assert!(!fixed.node_comparable(&spread));
    }
}
