//! Derives per-column routing arguments from a table filter's accumulated
//! index conditions.

use std::collections::BTreeMap;

use shrike_common::datum::Datum;

use crate::argument::RoutingArgument;
use crate::filter::{IndexCondition, TableFilter};

/// The tightest-known predicate per sharding column, plus an
/// unsatisfiability verdict for the filter as a whole.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub arguments: Vec<RoutingArgument>,
    always_false: bool,
}

impl Extraction {
    /// Conditions are provably unsatisfiable (e.g. `c = 1 AND c = 2`, or
    /// `c > 5 AND c < 3`): the caller can skip execution entirely and
    /// return an empty result without touching any backend.
    pub fn is_always_false(&self) -> bool {
        self.always_false
    }
}

/// Per-column accumulator while folding conditions together.
#[derive(Debug, Default, Clone)]
struct ColumnBounds {
    /// Intersection of every equality list seen; `None` = no equality yet.
    values: Option<Vec<Datum>>,
    low: Option<Datum>,
    high: Option<Datum>,
}

impl ColumnBounds {
    fn merge(&mut self, cond: &IndexCondition) {
        match cond {
            IndexCondition::Equality { values, .. } => {
                self.values = Some(match self.values.take() {
                    None => values.clone(),
                    Some(existing) => existing
                        .into_iter()
                        .filter(|v| values.contains(v))
                        .collect(),
                });
            }
            IndexCondition::Range { low, high, .. } => {
                if let Some(l) = low {
                    let tighter = match &self.low {
                        Some(cur) => l > cur,
                        None => true,
                    };
                    if tighter {
                        self.low = Some(l.clone());
                    }
                }
                if let Some(h) = high {
                    let tighter = match &self.high {
                        Some(cur) => h < cur,
                        None => true,
                    };
                    if tighter {
                        self.high = Some(h.clone());
                    }
                }
            }
        }
    }

    /// Clamp the equality set to the range bounds, when both are present.
    fn normalize(&mut self) {
        if let Some(values) = &mut self.values {
            if self.low.is_some() || self.high.is_some() {
                values.retain(|v| {
                    self.low.as_ref().map(|l| v >= l).unwrap_or(true)
                        && self.high.as_ref().map(|h| v <= h).unwrap_or(true)
                });
            }
        }
    }

    fn contradictory(&self) -> bool {
        if let Some(values) = &self.values {
            if values.is_empty() {
                return true;
            }
        }
        match (&self.low, &self.high) {
            (Some(l), Some(h)) => l > h,
            _ => false,
        }
    }

    fn to_argument(&self, column: &str) -> RoutingArgument {
        match &self.values {
            Some(values) => RoutingArgument::fixed(column, values.clone()),
            None if self.low.is_some() || self.high.is_some() => {
                RoutingArgument::range(column, self.low.clone(), self.high.clone())
            }
            None => RoutingArgument::none(column),
        }
    }
}

/// Walks a table filter's index conditions and derives a
/// [`RoutingArgument`] per sharding column: an equality list if one exists,
/// else a range if bounds exist, else NONE (forcing a full broadcast —
/// correctness over performance).
pub struct ConditionExtractor;

impl ConditionExtractor {
    pub fn extract(filter: &TableFilter, rule_columns: &[String]) -> Extraction {
        let mut per_column: BTreeMap<String, ColumnBounds> = BTreeMap::new();
        for cond in &filter.conditions {
            per_column
                .entry(cond.column().to_ascii_lowercase())
                .or_default()
                .merge(cond);
        }
        for bounds in per_column.values_mut() {
            bounds.normalize();
        }

        // Contradiction on ANY column kills the filter, not just on the
        // sharding columns.
        let always_false = per_column.values().any(|b| b.contradictory());

        let arguments = rule_columns
            .iter()
            .map(|col| {
                per_column
                    .get(&col.to_ascii_lowercase())
                    .map(|b| b.to_argument(col))
                    .unwrap_or_else(|| RoutingArgument::none(col.clone()))
            })
            .collect();

        Extraction {
            arguments,
            always_false,
        }
    }
}
