use shrike_common::datum::Datum;

/// The predicate extracted from a query for one sharding column.
///
/// The source-of-truth invariant (a fixed value set exists iff the argument
/// is FIXED, bounds exist iff RANGE) is carried by the sum type itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingArgument {
    pub column: String,
    pub kind: ArgumentKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    /// No usable predicate: route to every node of the sharded set.
    None,
    /// Equality / IN-list predicate: a fixed set of values.
    Fixed(Vec<Datum>),
    /// Contiguous value range; an unbounded side is `None`.
    Range {
        start: Option<Datum>,
        end: Option<Datum>,
    },
}

impl RoutingArgument {
    pub fn none(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: ArgumentKind::None,
        }
    }

    pub fn fixed(column: impl Into<String>, values: Vec<Datum>) -> Self {
        Self {
            column: column.into(),
            kind: ArgumentKind::Fixed(values),
        }
    }

    pub fn range(column: impl Into<String>, start: Option<Datum>, end: Option<Datum>) -> Self {
        Self {
            column: column.into(),
            kind: ArgumentKind::Range { start, end },
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ArgumentKind::None)
    }
}
