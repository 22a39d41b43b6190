//! Routing-rule engine: maps a logical table plus predicate values to the
//! concrete set of physical shard/table nodes a statement must touch.
//!
//! Flow: a table filter's index conditions are distilled into per-column
//! [`argument::RoutingArgument`]s, the table's rule dispatches to the
//! configured partition algorithm, and the validated selection comes back
//! as a [`result::RoutingResult`].

pub mod argument;
pub mod build;
pub mod calculator;
pub mod condition;
pub mod filter;
pub mod handler;
pub mod object_node;
pub mod partition;
pub mod result;
pub mod rule;
pub mod table;

pub use argument::{ArgumentKind, RoutingArgument};
pub use build::build_tables;
pub use calculator::RoutingCalculator;
pub use condition::{ConditionExtractor, Extraction};
pub use filter::{ColumnRef, FilterSource, IndexCondition, JoinCondition, TableFilter};
pub use handler::RoutingHandler;
pub use object_node::{GroupObjectNode, ObjectNode, RouteNode};
pub use partition::{
    MultiColumnPartitioner, PartitionAlgorithm, Partitioner, PartitionerRegistry,
};
pub use result::RoutingResult;
pub use rule::{FixedNodeRule, GlobalNodeRule, ShardedNodeRule, TableRule};
pub use table::{ColumnMeta, TableMate};
