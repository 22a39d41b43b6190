//! Rewrites an abstract statement into concrete SQL text bound to one
//! physical node. Invoked once per worker at execution time; group targets
//! are translated member-by-member and wrapped in a UNION ALL.

use std::collections::HashMap;

use shrike_common::datum::{Datum, Row};
use shrike_common::error::{ShrikeResult, SqlError};
use shrike_router::filter::{IndexCondition, JoinCondition, TableFilter};
use shrike_router::object_node::ObjectNode;

use crate::statement::{
    CreateIndexStatement, CreateTableStatement, DeleteStatement, DropTableStatement,
    InsertStatement, UpdateStatement,
};

/// SQL text plus its bound parameters, ready for one backend round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedSql {
    pub text: String,
    pub params: Vec<Datum>,
}

impl TranslatedSql {
    pub fn new(text: impl Into<String>, params: Vec<Datum>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// The select shape handed to the translator by the select paths: already
/// rewritten select list, conditions per filter, and corrected
/// limit/offset.
pub struct SelectPushdown<'a> {
    /// Rendered select expressions, in output order.
    pub items: Vec<String>,
    /// Real table filters in join order; the first is the FROM anchor.
    pub filters: Vec<&'a TableFilter>,
    pub group_by: Vec<String>,
    /// Rendered ORDER BY entries; only pushed for single-node routes.
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    pub for_update: bool,
}

/// Dialect-specific statement rewrite, bound to one physical node per call.
pub trait SqlTranslator: Send + Sync {
    fn insert_rows(&self, stmt: &InsertStatement, node: &ObjectNode, rows: &[Row]) -> TranslatedSql;

    fn update(&self, stmt: &UpdateStatement, node: &ObjectNode) -> TranslatedSql;

    fn delete(&self, stmt: &DeleteStatement, node: &ObjectNode) -> TranslatedSql;

    /// `consistency` holds one alias → physical-node map per target member:
    /// a single map for a plain node, one per member for a same-shard group
    /// (the members are UNION ALLed).
    fn select(
        &self,
        plan: &SelectPushdown<'_>,
        consistency: &[HashMap<String, ObjectNode>],
    ) -> ShrikeResult<TranslatedSql>;

    fn create_table(&self, stmt: &CreateTableStatement, node: &ObjectNode) -> TranslatedSql;

    fn create_index(&self, stmt: &CreateIndexStatement, node: &ObjectNode) -> TranslatedSql;

    fn drop_table(&self, stmt: &DropTableStatement, node: &ObjectNode) -> TranslatedSql;
}

/// MySQL dialect.
#[derive(Debug, Default)]
pub struct MySqlTranslator;

fn quote(ident: &str) -> String {
    format!("`{}`", ident)
}

/// `schema`.`table_suffix` rendering of a physical node.
fn physical_name(node: &ObjectNode) -> String {
    let mut out = String::new();
    if let Some(c) = &node.catalog {
        out.push_str(&quote(c));
        out.push('.');
    }
    if let Some(s) = &node.schema {
        out.push_str(&quote(s));
        out.push('.');
    }
    out.push_str(&quote(&node.qualified_table()));
    out
}

fn render_condition(
    alias: Option<&str>,
    cond: &IndexCondition,
    params: &mut Vec<Datum>,
) -> String {
    let col = match alias {
        Some(a) => format!("{}.{}", quote(a), quote(cond.column())),
        None => quote(cond.column()),
    };
    match cond {
        IndexCondition::Equality { values, .. } => {
            if values.len() == 1 {
                params.push(values[0].clone());
                format!("{} = ?", col)
            } else {
                let marks = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().cloned());
                format!("{} IN ({})", col, marks)
            }
        }
        IndexCondition::Range { low, high, .. } => {
            let mut parts = Vec::new();
            if let Some(l) = low {
                params.push(l.clone());
                parts.push(format!("{} >= ?", col));
            }
            if let Some(h) = high {
                params.push(h.clone());
                parts.push(format!("{} <= ?", col));
            }
            parts.join(" AND ")
        }
    }
}

fn render_join(j: &JoinCondition) -> String {
    format!(
        "{}.{} = {}.{}",
        quote(&j.left.table_alias),
        quote(&j.left.column),
        quote(&j.right.table_alias),
        quote(&j.right.column)
    )
}

impl MySqlTranslator {
    fn select_one_member(
        &self,
        plan: &SelectPushdown<'_>,
        consistency: &HashMap<String, ObjectNode>,
        params: &mut Vec<Datum>,
    ) -> ShrikeResult<String> {
        let mut sql = String::from("SELECT ");
        if plan.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&plan.items.join(", "));

        let mut from_parts = Vec::with_capacity(plan.filters.len());
        for filter in &plan.filters {
            let node = consistency.get(&filter.alias).ok_or_else(|| {
                SqlError::UnknownTable(format!("no consistent node for alias '{}'", filter.alias))
            })?;
            from_parts.push(format!("{} AS {}", physical_name(node), quote(&filter.alias)));
        }
        sql.push_str(" FROM ");
        sql.push_str(&from_parts.join(", "));

        let mut predicates: Vec<String> = Vec::new();
        let mut seen_joins: Vec<&JoinCondition> = Vec::new();
        for filter in &plan.filters {
            for join in &filter.joins {
                if !seen_joins.iter().any(|j| {
                    (j.left == join.left && j.right == join.right)
                        || (j.left == join.right && j.right == join.left)
                }) {
                    seen_joins.push(join);
                    predicates.push(render_join(join));
                }
            }
            let alias = if plan.filters.len() > 1 {
                Some(filter.alias.as_str())
            } else {
                None
            };
            for cond in &filter.conditions {
                let rendered = render_condition(alias, cond, params);
                if !rendered.is_empty() {
                    predicates.push(rendered);
                }
            }
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if !plan.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&plan.group_by.join(", "));
        }
        if !plan.order_by.is_empty() {
            let rendered: Vec<String> = plan
                .order_by
                .iter()
                .map(|(e, asc)| format!("{} {}", e, if *asc { "ASC" } else { "DESC" }))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&rendered.join(", "));
        }
        if let Some(limit) = plan.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = plan.offset.filter(|&o| o > 0) {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        if plan.for_update {
            sql.push_str(" FOR UPDATE");
        }
        Ok(sql)
    }
}

impl SqlTranslator for MySqlTranslator {
    fn insert_rows(&self, stmt: &InsertStatement, node: &ObjectNode, rows: &[Row]) -> TranslatedSql {
        let cols: Vec<String> = stmt.columns.iter().map(|c| quote(c)).collect();
        let row_marks = format!("({})", vec!["?"; stmt.columns.len()].join(", "));
        let all_marks = vec![row_marks; rows.len()].join(", ");
        let params: Vec<Datum> = rows.iter().flat_map(|r| r.iter().cloned()).collect();
        TranslatedSql::new(
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                physical_name(node),
                cols.join(", "),
                all_marks
            ),
            params,
        )
    }

    fn update(&self, stmt: &UpdateStatement, node: &ObjectNode) -> TranslatedSql {
        let mut params = Vec::new();
        let sets: Vec<String> = stmt
            .assignments
            .iter()
            .map(|(col, value)| {
                params.push(value.clone());
                format!("{} = ?", quote(col))
            })
            .collect();
        let mut sql = format!("UPDATE {} SET {}", physical_name(node), sets.join(", "));
        let predicates: Vec<String> = stmt
            .filter
            .conditions
            .iter()
            .map(|c| render_condition(None, c, &mut params))
            .filter(|p| !p.is_empty())
            .collect();
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        TranslatedSql::new(sql, params)
    }

    fn delete(&self, stmt: &DeleteStatement, node: &ObjectNode) -> TranslatedSql {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", physical_name(node));
        let predicates: Vec<String> = stmt
            .filter
            .conditions
            .iter()
            .map(|c| render_condition(None, c, &mut params))
            .filter(|p| !p.is_empty())
            .collect();
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        TranslatedSql::new(sql, params)
    }

    fn select(
        &self,
        plan: &SelectPushdown<'_>,
        consistency: &[HashMap<String, ObjectNode>],
    ) -> ShrikeResult<TranslatedSql> {
        let mut params = Vec::new();
        if consistency.len() == 1 {
            let sql = self.select_one_member(plan, &consistency[0], &mut params)?;
            return Ok(TranslatedSql::new(sql, params));
        }
        // Same-shard fold: one branch per member, one round trip total.
        let mut branches = Vec::with_capacity(consistency.len());
        for member in consistency {
            let sql = self.select_one_member(plan, member, &mut params)?;
            branches.push(format!("({})", sql));
        }
        Ok(TranslatedSql::new(branches.join(" UNION ALL "), params))
    }

    fn create_table(&self, stmt: &CreateTableStatement, node: &ObjectNode) -> TranslatedSql {
        let cols: Vec<String> = stmt
            .columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.type_name))
            .collect();
        let if_clause = if stmt.if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        TranslatedSql::new(
            format!(
                "CREATE TABLE {}{} ({})",
                if_clause,
                physical_name(node),
                cols.join(", ")
            ),
            Vec::new(),
        )
    }

    fn create_index(&self, stmt: &CreateIndexStatement, node: &ObjectNode) -> TranslatedSql {
        let cols: Vec<String> = stmt.columns.iter().map(|c| quote(c)).collect();
        let unique = if stmt.unique { "UNIQUE " } else { "" };
        // Index names carry the table suffix so same-shard partitions never
        // collide.
        let index_name = match &node.suffix {
            Some(s) => format!("{}_{}", stmt.index_name, s),
            None => stmt.index_name.clone(),
        };
        TranslatedSql::new(
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                unique,
                quote(&index_name),
                physical_name(node),
                cols.join(", ")
            ),
            Vec::new(),
        )
    }

    fn drop_table(&self, stmt: &DropTableStatement, node: &ObjectNode) -> TranslatedSql {
        let if_clause = if stmt.if_exists { "IF EXISTS " } else { "" };
        TranslatedSql::new(
            format!("DROP TABLE {}{}", if_clause, physical_name(node)),
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_router::object_node::ObjectNode;
    use shrike_router::rule::TableRule;
    use shrike_router::table::TableMate;
    use std::sync::Arc;

    fn mate(name: &str) -> Arc<TableMate> {
        Arc::new(TableMate::new(
            name,
            vec![],
            TableRule::fixed(ObjectNode::new("s0", name)),
        ))
    }

    #[test]
    fn test_insert_multi_row() {
        let stmt = InsertStatement {
            table: mate("orders"),
            columns: vec!["id".into(), "customer_id".into()],
            source: crate::statement::InsertSource::Values(vec![]),
        };
        let node = ObjectNode::new("s1", "orders").with_suffix("0001");
        let rows = vec![
            vec![Datum::Int64(1), Datum::Int64(7)],
            vec![Datum::Int64(2), Datum::Int64(10)],
        ];
        let t = MySqlTranslator.insert_rows(&stmt, &node, &rows);
        assert_eq!(
            t.text,
            "INSERT INTO `orders_0001` (`id`, `customer_id`) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(t.params.len(), 4);
    }

    #[test]
    fn test_select_single_member_with_conditions() {
        let t = mate("orders");
        let filter = TableFilter::table("o", t).with_condition(IndexCondition::in_list(
            "customer_id",
            vec![Datum::Int64(1), Datum::Int64(4)],
        ));
        let plan = SelectPushdown {
            items: vec!["`o`.`id`".into()],
            filters: vec![&filter],
            group_by: vec![],
            order_by: vec![],
            limit: Some(8),
            offset: None,
            distinct: false,
            for_update: false,
        };
        let mut consistency = HashMap::new();
        consistency.insert(
            "o".to_string(),
            ObjectNode::new("s0", "orders").with_suffix("0000"),
        );
        let out = MySqlTranslator.select(&plan, &[consistency]).unwrap();
        assert_eq!(
            out.text,
            "SELECT `o`.`id` FROM `orders_0000` AS `o` WHERE `customer_id` IN (?, ?) LIMIT 8"
        );
        assert_eq!(out.params, vec![Datum::Int64(1), Datum::Int64(4)]);
    }

    #[test]
    fn test_select_group_target_unions_members() {
        let t = mate("orders");
        let filter = TableFilter::table("o", t);
        let plan = SelectPushdown {
            items: vec!["`o`.`id`".into()],
            filters: vec![&filter],
            group_by: vec![],
            order_by: vec![],
            limit: None,
            offset: None,
            distinct: false,
            for_update: false,
        };
        let member = |suffix: &str| {
            let mut m = HashMap::new();
            m.insert(
                "o".to_string(),
                ObjectNode::new("s0", "orders").with_suffix(suffix),
            );
            m
        };
        let out = MySqlTranslator
            .select(&plan, &[member("0000"), member("0002")])
            .unwrap();
        assert_eq!(
            out.text,
            "(SELECT `o`.`id` FROM `orders_0000` AS `o`) UNION ALL \
             (SELECT `o`.`id` FROM `orders_0002` AS `o`)"
        );
    }

    #[test]
    fn test_update_and_delete_render_where() {
        let t = mate("orders");
        let stmt = UpdateStatement {
            table: t.clone(),
            filter: TableFilter::table("orders", t.clone())
                .with_condition(IndexCondition::eq("id", Datum::Int64(9))),
            assignments: vec![("status".into(), Datum::Text("done".into()))],
        };
        let node = ObjectNode::new("s0", "orders");
        let out = MySqlTranslator.update(&stmt, &node);
        assert_eq!(out.text, "UPDATE `orders` SET `status` = ? WHERE `id` = ?");
        assert_eq!(
            out.params,
            vec![Datum::Text("done".into()), Datum::Int64(9)]
        );

        let del = DeleteStatement {
            table: t.clone(),
            filter: TableFilter::table("orders", t)
                .with_condition(IndexCondition::range("id", Some(Datum::Int64(5)), None)),
        };
        let out = MySqlTranslator.delete(&del, &node);
        assert_eq!(out.text, "DELETE FROM `orders` WHERE `id` >= ?");
    }
}
