//! The outcome of routing one table access.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::object_node::{GroupObjectNode, ObjectNode, RouteNode};

/// Selected subset of a table's physical nodes, together with the full node
/// universe it was drawn from.
///
/// `all` is deliberately kept as the true universe rather than aliased to
/// `selected`: `is_full_node` is only meaningful against the real node set,
/// and the cheapest-route comparison needs both. Computed fresh per
/// statement; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingResult {
    all: Vec<ObjectNode>,
    selected: Vec<ObjectNode>,
}

impl RoutingResult {
    /// `selected` must be drawn from `all`; violations are a routing-layer
    /// bug, caught in debug builds.
    pub fn new(all: Vec<ObjectNode>, selected: Vec<ObjectNode>) -> Self {
        debug_assert!(selected.len() <= all.len());
        debug_assert!(selected.iter().all(|n| all.contains(n)));
        Self { all, selected }
    }

    /// Route that selects every node of the universe.
    pub fn full(all: Vec<ObjectNode>) -> Self {
        let selected = all.clone();
        Self { all, selected }
    }

    /// Route with an empty selection (provably-unsatisfiable predicate).
    pub fn empty(all: Vec<ObjectNode>) -> Self {
        Self {
            all,
            selected: Vec::new(),
        }
    }

    pub fn single(node: ObjectNode) -> Self {
        Self {
            all: vec![node.clone()],
            selected: vec![node],
        }
    }

    pub fn all_nodes(&self) -> &[ObjectNode] {
        &self.all
    }

    pub fn selected(&self) -> &[ObjectNode] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_multiple_node(&self) -> bool {
        self.selected.len() > 1
    }

    /// Whether the selection covers the entire node universe.
    pub fn is_full_node(&self) -> bool {
        self.selected.len() == self.all.len()
    }

    /// The single selected node, when exactly one was selected.
    pub fn single_node(&self) -> Option<&ObjectNode> {
        match self.selected.as_slice() {
            [node] => Some(node),
            _ => None,
        }
    }

    pub fn distinct_shard_count(&self) -> usize {
        self.selected
            .iter()
            .map(|n| n.shard_name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Fold same-shard nodes into [`GroupObjectNode`]s so each shard is hit
    /// with one UNION ALL round trip. With `fold` disabled (or nothing to
    /// fold) every selected node becomes its own target. Submission order
    /// follows first appearance of each shard in the selection.
    pub fn group(&self, fold: bool) -> Vec<RouteNode> {
        if !fold {
            return self
                .selected
                .iter()
                .cloned()
                .map(RouteNode::Single)
                .collect();
        }
        let mut shard_order: Vec<&str> = Vec::new();
        for node in &self.selected {
            if !shard_order.contains(&node.shard_name.as_str()) {
                shard_order.push(&node.shard_name);
            }
        }
        shard_order
            .into_iter()
            .map(|shard| {
                let members: Vec<ObjectNode> = self
                    .selected
                    .iter()
                    .filter(|n| n.shard_name == shard)
                    .cloned()
                    .collect();
                if members.len() == 1 {
                    RouteNode::Single(members.into_iter().next().expect("one member"))
                } else {
                    // Same shard by construction; the group invariant can
                    // only trip on catalog/schema mismatch, which is a
                    // configuration bug worth surfacing loudly.
                    match GroupObjectNode::new(members) {
                        Ok(g) => RouteNode::Group(g),
                        Err(e) => {
                            tracing::warn!("push-down fold disabled for shard {shard}: {e}");
                            RouteNode::Single(
                                self.selected
                                    .iter()
                                    .find(|n| n.shard_name == shard)
                                    .expect("shard has members")
                                    .clone(),
                            )
                        }
                    }
                }
            })
            .collect()
    }
}

/// Orders candidate routings from cheapest to most expensive: fewer
/// distinct shards first, then fewer nodes. Used to pick the authoritative
/// route among several node-comparable table filters in a join.
impl Ord for RoutingResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distinct_shard_count()
            .cmp(&other.distinct_shard_count())
            .then(self.selected.len().cmp(&other.selected.len()))
    }
}

impl PartialOrd for RoutingResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
