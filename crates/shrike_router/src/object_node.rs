use std::fmt;

use shrike_common::error::RoutingError;

/// One physical table instance: table T on shard S, optionally with a
/// per-partition suffix. Value-equality over all five fields; immutable
/// once used as a routing target or map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectNode {
    pub shard_name: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub object_name: String,
    pub suffix: Option<String>,
}

impl ObjectNode {
    pub fn new(shard_name: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            shard_name: shard_name.into(),
            catalog: None,
            schema: None,
            object_name: object_name.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Physical table name as rendered into SQL: `object_name` plus the
    /// partition suffix, if any.
    pub fn qualified_table(&self) -> String {
        match &self.suffix {
            Some(s) => format!("{}_{}", self.object_name, s),
            None => self.object_name.clone(),
        }
    }
}

impl fmt::Display for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.", self.shard_name)?;
        if let Some(c) = &self.catalog {
            write!(f, "{}.", c)?;
        }
        if let Some(s) = &self.schema {
            write!(f, "{}.", s)?;
        }
        write!(f, "{}", self.qualified_table())
    }
}

/// Several same-shard [`ObjectNode`]s folded into one push-down unit: one
/// UNION ALL query against one physical connection instead of N round trips.
///
/// Invariant: every item shares the group's shard, catalog, and schema.
/// Enforced at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupObjectNode {
    pub shard_name: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    items: Vec<ObjectNode>,
}

impl GroupObjectNode {
    pub fn new(items: Vec<ObjectNode>) -> Result<Self, RoutingError> {
        let first = items.first().ok_or(RoutingError::NoCandidateRoute)?.clone();
        for item in &items[1..] {
            if item.shard_name != first.shard_name {
                return Err(RoutingError::InconsistentGroup {
                    left: first.to_string(),
                    right: item.to_string(),
                    field: "shard",
                });
            }
            if item.catalog != first.catalog {
                return Err(RoutingError::InconsistentGroup {
                    left: first.to_string(),
                    right: item.to_string(),
                    field: "catalog",
                });
            }
            if item.schema != first.schema {
                return Err(RoutingError::InconsistentGroup {
                    left: first.to_string(),
                    right: item.to_string(),
                    field: "schema",
                });
            }
        }
        Ok(Self {
            shard_name: first.shard_name,
            catalog: first.catalog,
            schema: first.schema,
            items,
        })
    }

    pub fn items(&self) -> &[ObjectNode] {
        &self.items
    }

    pub fn table_names(&self) -> Vec<String> {
        self.items.iter().map(|n| n.object_name.clone()).collect()
    }

    pub fn suffixes(&self) -> Vec<Option<String>> {
        self.items.iter().map(|n| n.suffix.clone()).collect()
    }
}

impl fmt::Display for GroupObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables: Vec<String> = self.items.iter().map(|n| n.qualified_table()).collect();
        write!(f, "{}.[{}]", self.shard_name, tables.join(","))
    }
}

/// A worker's destination: one physical table, or a same-shard group folded
/// into a single UNION ALL unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteNode {
    Single(ObjectNode),
    Group(GroupObjectNode),
}

impl RouteNode {
    pub fn shard_name(&self) -> &str {
        match self {
            RouteNode::Single(n) => &n.shard_name,
            RouteNode::Group(g) => &g.shard_name,
        }
    }

    /// Underlying object nodes: one for a single target, all members for a
    /// group target.
    pub fn object_nodes(&self) -> &[ObjectNode] {
        match self {
            RouteNode::Single(n) => std::slice::from_ref(n),
            RouteNode::Group(g) => g.items(),
        }
    }
}

impl fmt::Display for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteNode::Single(n) => write!(f, "{}", n),
            RouteNode::Group(g) => write!(f, "{}", g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(shard: &str, table: &str, suffix: &str) -> ObjectNode {
        ObjectNode::new(shard, table).with_suffix(suffix)
    }

    #[test]
    fn test_value_equality_over_all_fields() {
        let a = node("s0", "orders", "0001");
        let b = node("s0", "orders", "0001");
        assert_eq!(a, b);
        let c = node("s0", "orders", "0002");
        assert_ne!(a, c);
    }

    #[test]
    fn test_qualified_table_applies_suffix() {
        assert_eq!(node("s0", "orders", "0001").qualified_table(), "orders_0001");
        assert_eq!(ObjectNode::new("s0", "orders").qualified_table(), "orders");
    }

    // ── GroupObjectNode invariant ────────────────────────────────────────

    #[test]
    fn test_group_same_shard_ok() {
        let g = GroupObjectNode::new(vec![
            node("s0", "orders", "0000"),
            node("s0", "orders", "0002"),
        ])
        .unwrap();
        assert_eq!(g.shard_name, "s0");
        assert_eq!(g.table_names(), vec!["orders", "orders"]);
        assert_eq!(g.items().len(), 2);
    }

    #[test]
    fn test_group_mixed_shard_fails() {
        let err = GroupObjectNode::new(vec![
            node("s0", "orders", "0000"),
            node("s1", "orders", "0001"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::InconsistentGroup { field: "shard", .. }
        ));
    }

    #[test]
    fn test_group_mixed_schema_fails() {
        let err = GroupObjectNode::new(vec![
            node("s0", "orders", "0000").with_schema("a"),
            node("s0", "orders", "0001").with_schema("b"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::InconsistentGroup { field: "schema", .. }
        ));
    }

    #[test]
    fn test_group_mixed_catalog_fails() {
        let err = GroupObjectNode::new(vec![
            node("s0", "orders", "0000").with_catalog("c1"),
            node("s0", "orders", "0001").with_catalog("c2"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::InconsistentGroup { field: "catalog", .. }
        ));
    }
}
