//! Facade combining condition extraction, the routing calculator, and
//! table-rule dispatch: "which nodes must I hit for this table, given these
//! conditions / row values?"

use rand::Rng;
use shrike_common::datum::Datum;
use shrike_common::error::{ShrikeError, ShrikeResult, SqlError};

use crate::argument::RoutingArgument;
use crate::calculator::RoutingCalculator;
use crate::condition::ConditionExtractor;
use crate::filter::TableFilter;
use crate::result::RoutingResult;
use crate::rule::{ShardedNodeRule, TableRule};
use crate::table::TableMate;

pub struct RoutingHandler;

impl RoutingHandler {
    /// Route with no predicate: fixed → its node, global → every replica,
    /// sharded → every node. Used by DDL.
    pub fn route_unconditional(table: &TableMate) -> RoutingResult {
        RoutingResult::full(table.rule.all_nodes().to_vec())
    }

    /// Read access routed by a filter's conditions. Global tables answer
    /// identically on any replica, so one is picked at random — the choice
    /// of read-one over broadcast belongs to the calling executor, which
    /// reaches this method only for reads.
    pub fn route_read(table: &TableMate, filter: &TableFilter) -> ShrikeResult<RoutingResult> {
        match &table.rule {
            TableRule::Fixed(r) => Ok(RoutingResult::single(r.node.clone())),
            TableRule::Global(r) => {
                let pick = rand::thread_rng().gen_range(0..r.broadcasts.len());
                Ok(RoutingResult::new(
                    r.broadcasts.clone(),
                    vec![r.broadcasts[pick].clone()],
                ))
            }
            TableRule::Sharded(rule) => Self::route_sharded(table, rule, filter),
        }
    }

    /// Write access routed by a filter's conditions. Global tables must hit
    /// every replica to stay consistent.
    pub fn route_write(table: &TableMate, filter: &TableFilter) -> ShrikeResult<RoutingResult> {
        match &table.rule {
            TableRule::Fixed(r) => Ok(RoutingResult::single(r.node.clone())),
            TableRule::Global(r) => Ok(RoutingResult::full(r.broadcasts.clone())),
            TableRule::Sharded(rule) => Self::route_sharded(table, rule, filter),
        }
    }

    /// INSERT routing for one already-bound row: the row's actual values
    /// become FIXED arguments (never a range), one per rule column.
    ///
    /// `columns` names the insert column list in row order.
    pub fn route_for_row(
        table: &TableMate,
        columns: &[String],
        row: &[Datum],
    ) -> ShrikeResult<RoutingResult> {
        match &table.rule {
            TableRule::Fixed(r) => Ok(RoutingResult::single(r.node.clone())),
            TableRule::Global(r) => Ok(RoutingResult::full(r.broadcasts.clone())),
            TableRule::Sharded(rule) => {
                let mut arguments = Vec::with_capacity(rule.rule_columns.len());
                for rule_col in &rule.rule_columns {
                    let pos = columns
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case(rule_col))
                        .ok_or_else(|| SqlError::UnknownColumn {
                            table: table.name.clone(),
                            column: rule_col.clone(),
                        })?;
                    arguments.push(RoutingArgument::fixed(
                        rule_col.clone(),
                        vec![row[pos].clone()],
                    ));
                }
                Self::calculate(table, rule, arguments)
            }
        }
    }

    fn route_sharded(
        table: &TableMate,
        rule: &ShardedNodeRule,
        filter: &TableFilter,
    ) -> ShrikeResult<RoutingResult> {
        let extraction = ConditionExtractor::extract(filter, &rule.rule_columns);
        if extraction.is_always_false() {
            // Provably unsatisfiable predicate: empty selection, no backend
            // touched. Callers short-circuit on is_empty().
            tracing::debug!(table = table.name.as_str(), "always-false predicate, empty route");
            return Ok(RoutingResult::empty(rule.nodes.clone()));
        }
        Self::calculate(table, rule, extraction.arguments)
    }

    fn calculate(
        table: &TableMate,
        rule: &ShardedNodeRule,
        arguments: Vec<RoutingArgument>,
    ) -> ShrikeResult<RoutingResult> {
        let result = if arguments.len() == 1 {
            RoutingCalculator::calculate(&table.name, rule, &arguments[0])
        } else {
            RoutingCalculator::calculate_multi(&table.name, rule, &arguments)
        };
        result.map_err(ShrikeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IndexCondition;
    use crate::object_node::ObjectNode;
    use crate::partition::{ModPartitioner, PartitionAlgorithm};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn sharded_table(n: usize) -> Arc<TableMate> {
        let nodes = (0..n)
            .map(|i| ObjectNode::new(format!("s{}", i % n), "orders").with_suffix(format!("{:04}", i)))
            .collect();
        Arc::new(TableMate::new(
            "orders",
            vec![],
            TableRule::sharded(
                nodes,
                vec!["customer_id".into()],
                "mod",
                Arc::new(PartitionAlgorithm::Single(Box::new(ModPartitioner::new(n)))),
            ),
        ))
    }

    fn global_table() -> Arc<TableMate> {
        let nodes = (0..3)
            .map(|i| ObjectNode::new(format!("s{}", i), "currency_rates"))
            .collect();
        Arc::new(TableMate::new("currency_rates", vec![], TableRule::global(nodes)))
    }

    #[test]
    fn test_insert_row_routes_to_one_node() {
        let t = sharded_table(3);
        let r = RoutingHandler::route_for_row(
            &t,
            &["id".into(), "customer_id".into()],
            &[Datum::Int64(100), Datum::Int64(7)],
        )
        .unwrap();
        // 7 mod 3 = 1
        assert_eq!(r.selected().len(), 1);
        assert_eq!(r.selected()[0].shard_name, "s1");
    }

    #[test]
    fn test_insert_missing_rule_column_is_an_error() {
        let t = sharded_table(3);
        let err =
            RoutingHandler::route_for_row(&t, &["id".into()], &[Datum::Int64(100)]).unwrap_err();
        assert!(matches!(err, ShrikeError::Sql(SqlError::UnknownColumn { .. })));
    }

    #[test]
    fn test_in_list_folds_to_single_node() {
        let t = sharded_table(3);
        let filter = TableFilter::table("o", t.clone()).with_condition(IndexCondition::in_list(
            "customer_id",
            vec![Datum::Int64(1), Datum::Int64(4), Datum::Int64(7)],
        ));
        let r = RoutingHandler::route_read(&t, &filter).unwrap();
        assert_eq!(r.selected().len(), 1);
        assert_eq!(r.selected()[0].shard_name, "s1");
    }

    #[test]
    fn test_no_predicate_broadcasts_sharded_set() {
        let t = sharded_table(3);
        let filter = TableFilter::table("o", t.clone());
        let r = RoutingHandler::route_read(&t, &filter).unwrap();
        assert_eq!(r.selected().len(), 3);
    }

    #[test]
    fn test_always_false_yields_empty_route() {
        let t = sharded_table(3);
        let filter = TableFilter::table("o", t.clone())
            .with_condition(IndexCondition::eq("customer_id", Datum::Int64(1)))
            .with_condition(IndexCondition::eq("customer_id", Datum::Int64(2)));
        let r = RoutingHandler::route_read(&t, &filter).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_global_write_broadcasts_read_picks_one() {
        let t = global_table();
        let filter = TableFilter::table("c", t.clone());
        let w = RoutingHandler::route_write(&t, &filter).unwrap();
        assert_eq!(w.selected().len(), 3);

        let shards: BTreeSet<String> = (0..32)
            .map(|_| {
                let r = RoutingHandler::route_read(&t, &filter).unwrap();
                assert_eq!(r.selected().len(), 1);
                assert_eq!(r.all_nodes().len(), 3);
                r.selected()[0].shard_name.clone()
            })
            .collect();
        // Any replica is legal; every pick must come from the broadcast set.
        assert!(shards.iter().all(|s| ["s0", "s1", "s2"].contains(&s.as_str())));
    }

    #[test]
    fn test_fixed_table_ignores_predicates() {
        let t = Arc::new(TableMate::new(
            "settings",
            vec![],
            TableRule::fixed(ObjectNode::new("s2", "settings")),
        ));
        let filter = TableFilter::table("t", t.clone())
            .with_condition(IndexCondition::eq("id", Datum::Int64(9)));
        let r = RoutingHandler::route_write(&t, &filter).unwrap();
        assert_eq!(r.selected()[0].shard_name, "s2");
        assert_eq!(r.selected().len(), 1);
    }
}
