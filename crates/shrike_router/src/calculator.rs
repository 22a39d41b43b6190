//! Invokes the partition algorithm against a table rule and validates every
//! index it returns before a [`RoutingResult`] is built.

use shrike_common::error::RuleError;

use crate::argument::{ArgumentKind, RoutingArgument};
use crate::partition::PartitionAlgorithm;
use crate::result::RoutingResult;
use crate::rule::ShardedNodeRule;

pub struct RoutingCalculator;

impl RoutingCalculator {
    /// Route by a single column's argument. The rule's algorithm must carry
    /// the single-column capability; a mismatch is a configuration error
    /// detected here, at first use.
    pub fn calculate(
        table: &str,
        rule: &ShardedNodeRule,
        argument: &RoutingArgument,
    ) -> Result<RoutingResult, RuleError> {
        let partitioner = match rule.algorithm.as_ref() {
            PartitionAlgorithm::Single(p) => p,
            PartitionAlgorithm::Multi(_) => {
                return Err(RuleError::MissingCapability {
                    algorithm: rule.algorithm_name.clone(),
                    capability: "single-column",
                    table: table.to_string(),
                })
            }
        };

        match &argument.kind {
            // No usable predicate: every node of the sharded set.
            ArgumentKind::None => Ok(RoutingResult::full(rule.nodes.clone())),
            ArgumentKind::Fixed(values) => {
                let indices = partitioner.partition(values);
                Self::select(rule, indices)
            }
            ArgumentKind::Range { start, end } => {
                match partitioner.partition_range(start.as_ref(), end.as_ref()) {
                    // Algorithm cannot prune a range: broadcast.
                    None => Ok(RoutingResult::full(rule.nodes.clone())),
                    Some(indices) => Self::select(rule, indices),
                }
            }
        }
    }

    /// Route by every rule column's argument at once. Requires the
    /// multi-column capability; same fail-fast policy.
    pub fn calculate_multi(
        table: &str,
        rule: &ShardedNodeRule,
        arguments: &[RoutingArgument],
    ) -> Result<RoutingResult, RuleError> {
        let partitioner = match rule.algorithm.as_ref() {
            PartitionAlgorithm::Multi(p) => p,
            PartitionAlgorithm::Single(_) => {
                return Err(RuleError::MissingCapability {
                    algorithm: rule.algorithm_name.clone(),
                    capability: "multi-column",
                    table: table.to_string(),
                })
            }
        };

        if arguments.iter().all(|a| a.is_none()) {
            return Ok(RoutingResult::full(rule.nodes.clone()));
        }
        let indices = partitioner.partition(arguments);
        Self::select(rule, indices)
    }

    /// Defensive boundary against third-party algorithm bugs: every index
    /// must lie in `[0, node_count)`. Violations fail the statement naming
    /// the algorithm and the bad value — never silently clamped or dropped.
    fn select(rule: &ShardedNodeRule, indices: Vec<i64>) -> Result<RoutingResult, RuleError> {
        let node_count = rule.nodes.len();
        let mut picked = vec![false; node_count];
        for &idx in &indices {
            if idx < 0 || idx as usize >= node_count {
                return Err(RuleError::PartitionOutOfRange {
                    algorithm: rule.algorithm_name.clone(),
                    index: idx,
                    node_count,
                });
            }
            picked[idx as usize] = true;
        }
        if !picked.iter().any(|&p| p) {
            return Err(RuleError::EmptyPartition {
                algorithm: rule.algorithm_name.clone(),
            });
        }
        let selected = picked
            .iter()
            .enumerate()
            .filter(|(_, &p)| p)
            .map(|(i, _)| rule.nodes[i].clone())
            .collect::<Vec<_>>();
        tracing::debug!(
            algorithm = rule.algorithm_name.as_str(),
            selected = selected.len(),
            total = node_count,
            "partition selection"
        );
        Ok(RoutingResult::new(rule.nodes.clone(), selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_node::ObjectNode;
    use crate::partition::{
        ModPartitioner, MultiColumnHashPartitioner, PartitionAlgorithm, Partitioner,
    };
    use shrike_common::datum::Datum;
    use std::sync::Arc;

    fn sharded_rule(n: usize, algorithm: PartitionAlgorithm) -> ShardedNodeRule {
        let nodes = (0..n)
            .map(|i| ObjectNode::new(format!("s{}", i), "orders").with_suffix(format!("{:04}", i)))
            .collect();
        ShardedNodeRule {
            nodes,
            rule_columns: vec!["customer_id".into()],
            algorithm_name: "test".into(),
            algorithm: Arc::new(algorithm),
        }
    }

    fn mod_rule(n: usize) -> ShardedNodeRule {
        sharded_rule(n, PartitionAlgorithm::Single(Box::new(ModPartitioner::new(n))))
    }

    // ── argument dispatch ────────────────────────────────────────────────

    #[test]
    fn test_none_routes_to_every_node() {
        let rule = mod_rule(3);
        let r = RoutingCalculator::calculate("orders", &rule, &RoutingArgument::none("customer_id"))
            .unwrap();
        assert_eq!(r.selected().len(), 3);
        assert!(r.is_full_node());
    }

    #[test]
    fn test_fixed_selects_partition_per_value() {
        let rule = mod_rule(3);
        let arg = RoutingArgument::fixed(
            "customer_id",
            vec![Datum::Int64(1), Datum::Int64(4), Datum::Int64(7)],
        );
        let r = RoutingCalculator::calculate("orders", &rule, &arg).unwrap();
        assert_eq!(r.selected().len(), 1);
        assert_eq!(r.selected()[0].shard_name, "s1");
    }

    #[test]
    fn test_fixed_is_deterministic() {
        let rule = mod_rule(3);
        let arg = RoutingArgument::fixed("customer_id", vec![Datum::Int64(2), Datum::Int64(5)]);
        let a = RoutingCalculator::calculate("orders", &rule, &arg).unwrap();
        let b = RoutingCalculator::calculate("orders", &rule, &arg).unwrap();
        assert_eq!(a.selected(), b.selected());
    }

    #[test]
    fn test_range_without_pruning_broadcasts() {
        let rule = mod_rule(3);
        let arg = RoutingArgument::range(
            "customer_id",
            Some(Datum::Int64(1)),
            Some(Datum::Int64(2)),
        );
        let r = RoutingCalculator::calculate("orders", &rule, &arg).unwrap();
        assert!(r.is_full_node());
    }

    // ── capability dispatch ──────────────────────────────────────────────

    #[test]
    fn test_single_column_capability_required() {
        let rule = sharded_rule(
            4,
            PartitionAlgorithm::Multi(Box::new(MultiColumnHashPartitioner::new(4))),
        );
        let err = RoutingCalculator::calculate(
            "orders",
            &rule,
            &RoutingArgument::fixed("customer_id", vec![Datum::Int64(1)]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RuleError::MissingCapability {
                capability: "single-column",
                ..
            }
        ));
    }

    #[test]
    fn test_multi_column_capability_required() {
        let rule = mod_rule(3);
        let err = RoutingCalculator::calculate_multi(
            "orders",
            &rule,
            &[RoutingArgument::fixed("customer_id", vec![Datum::Int64(1)])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RuleError::MissingCapability {
                capability: "multi-column",
                ..
            }
        ));
    }

    #[test]
    fn test_multi_all_none_broadcasts_without_algorithm_call() {
        let rule = sharded_rule(
            4,
            PartitionAlgorithm::Multi(Box::new(MultiColumnHashPartitioner::new(4))),
        );
        let r = RoutingCalculator::calculate_multi(
            "orders",
            &rule,
            &[
                RoutingArgument::none("a"),
                RoutingArgument::none("b"),
            ],
        )
        .unwrap();
        assert!(r.is_full_node());
    }

    // ── index validation ─────────────────────────────────────────────────

    struct Broken(i64);
    impl Partitioner for Broken {
        fn partition(&self, values: &[Datum]) -> Vec<i64> {
            values.iter().map(|_| self.0).collect()
        }
    }

    #[test]
    fn test_out_of_range_index_fails_naming_algorithm() {
        let rule = sharded_rule(3, PartitionAlgorithm::Single(Box::new(Broken(5))));
        let err = RoutingCalculator::calculate(
            "orders",
            &rule,
            &RoutingArgument::fixed("customer_id", vec![Datum::Int64(1)]),
        )
        .unwrap_err();
        match err {
            RuleError::PartitionOutOfRange {
                algorithm,
                index,
                node_count,
            } => {
                assert_eq!(algorithm, "test");
                assert_eq!(index, 5);
                assert_eq!(node_count, 3);
            }
            other => panic!("expected PartitionOutOfRange, got {other}"),
        }
    }

    #[test]
    fn test_negative_index_fails() {
        let rule = sharded_rule(3, PartitionAlgorithm::Single(Box::new(Broken(-1))));
        let err = RoutingCalculator::calculate(
            "orders",
            &rule,
            &RoutingArgument::fixed("customer_id", vec![Datum::Int64(1)]),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::PartitionOutOfRange { index: -1, .. }));
    }

    #[test]
    fn test_empty_selection_fails() {
        struct Mute;
        impl Partitioner for Mute {
            fn partition(&self, _: &[Datum]) -> Vec<i64> {
                Vec::new()
            }
        }
        let rule = sharded_rule(3, PartitionAlgorithm::Single(Box::new(Mute)));
        let err = RoutingCalculator::calculate(
            "orders",
            &rule,
            &RoutingArgument::fixed("customer_id", vec![Datum::Int64(1)]),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::EmptyPartition { .. }));
    }
}
