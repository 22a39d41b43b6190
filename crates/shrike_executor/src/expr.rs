//! Select-list expressions as a closed tagged-variant AST, with the walk
//! used to discover aggregates nested inside other expressions.

use std::fmt;

use shrike_common::datum::Datum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Value(Datum),
    /// Column reference, optionally qualified by a table alias.
    Column {
        table_alias: Option<String>,
        name: String,
    },
    Aggregate {
        func: AggFunc,
        /// `None` = `COUNT(*)`.
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            table_alias: None,
            name: name.into(),
        }
    }

    pub fn qualified(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table_alias: Some(alias.into()),
            name: name.into(),
        }
    }

    pub fn count_star() -> Self {
        Expr::Aggregate {
            func: AggFunc::Count,
            arg: None,
            distinct: false,
        }
    }

    pub fn aggregate(func: AggFunc, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct: false,
        }
    }

    /// Depth-first walk over this expression and every child.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Value(_) | Expr::Column { .. } => {}
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.walk(visit);
                }
            }
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Function { args, .. } => {
                for a in args {
                    a.walk(visit);
                }
            }
        }
    }

    /// Every aggregate actually referenced anywhere inside this expression,
    /// in encounter order. Nested aggregates are found; unreferenced ones
    /// cannot appear by construction.
    pub fn referenced_aggregates<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        self.walk(&mut |e| {
            if matches!(e, Expr::Aggregate { .. }) && !out.iter().any(|x| *x == e) {
                out.push(e);
            }
        });
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Aggregate { .. }) {
                found = true;
            }
        });
        found
    }

    /// Render as SQL text. Column qualifiers are emitted as-is; the
    /// translator substitutes physical table names at the FROM level, so
    /// alias-qualified references stay valid on every node.
    pub fn to_sql(&self) -> String {
        match self {
            Expr::Value(v) => v.to_sql_literal(),
            Expr::Column { table_alias, name } => match table_alias {
                Some(a) => format!("`{}`.`{}`", a, name),
                None => format!("`{}`", name),
            },
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                let inner = match arg {
                    Some(e) => e.to_sql(),
                    None => "*".to_string(),
                };
                if *distinct {
                    format!("{}(DISTINCT {})", func.name(), inner)
                } else {
                    format!("{}({})", func.name(), inner)
                }
            }
            Expr::Binary { op, left, right } => {
                format!("({} {} {})", left.to_sql(), op.symbol(), right.to_sql())
            }
            Expr::Function { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_sql()).collect();
                format!("{}({})", name, rendered.join(", "))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_finds_nested_aggregates() {
        // SUM(amount) / COUNT(*) + 1
        let e = Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::Binary {
                op: BinOp::Div,
                left: Box::new(Expr::aggregate(AggFunc::Sum, Expr::column("amount"))),
                right: Box::new(Expr::count_star()),
            }),
            right: Box::new(Expr::Value(Datum::Int64(1))),
        };
        let mut aggs = Vec::new();
        e.referenced_aggregates(&mut aggs);
        assert_eq!(aggs.len(), 2);
        assert!(e.contains_aggregate());
    }

    #[test]
    fn test_duplicate_aggregates_collected_once() {
        let sum = Expr::aggregate(AggFunc::Sum, Expr::column("x"));
        let e = Expr::Binary {
            op: BinOp::Add,
            left: Box::new(sum.clone()),
            right: Box::new(sum),
        };
        let mut aggs = Vec::new();
        e.referenced_aggregates(&mut aggs);
        assert_eq!(aggs.len(), 1);
    }

    #[test]
    fn test_sql_rendering() {
        assert_eq!(Expr::qualified("o", "id").to_sql(), "`o`.`id`");
        assert_eq!(Expr::count_star().to_sql(), "COUNT(*)");
        assert_eq!(
            Expr::aggregate(AggFunc::Avg, Expr::column("price")).to_sql(),
            "AVG(`price`)"
        );
    }
}
