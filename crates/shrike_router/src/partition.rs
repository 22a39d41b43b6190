//! Partition algorithms and their registry.
//!
//! An algorithm maps routing arguments to partition indices. User-supplied
//! algorithms register a constructor closure under a name; rules resolve the
//! name at config-load time, so routing stays a pure function of
//! (rule, arguments, registry) with no reflection involved.
//!
//! Returned indices are `i64` on purpose: a third-party algorithm can hand
//! back a negative or out-of-range value, and the calculator treats that as
//! a rule-evaluation error rather than clamping it.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use shrike_common::datum::Datum;
use shrike_common::error::RuleError;
use xxhash_rust::xxh3::xxh3_64;

use crate::argument::{ArgumentKind, RoutingArgument};

/// Single-column partition capability.
pub trait Partitioner: Send + Sync {
    /// Map each fixed predicate value to partition indices.
    fn partition(&self, values: &[Datum]) -> Vec<i64>;

    /// Map a contiguous value range to the partitions it may span.
    /// `None` means the algorithm cannot prune a range (hash-style
    /// algorithms); the caller broadcasts to every node.
    fn partition_range(&self, start: Option<&Datum>, end: Option<&Datum>) -> Option<Vec<i64>> {
        let _ = (start, end);
        None
    }
}

/// Multi-column partition capability: sees every rule column's argument at
/// once.
pub trait MultiColumnPartitioner: Send + Sync {
    fn partition(&self, arguments: &[RoutingArgument]) -> Vec<i64>;
}

/// A configured algorithm instance, tagged with the capability it
/// implements. A table rule configured against the wrong capability fails
/// at first use, not at config load.
pub enum PartitionAlgorithm {
    Single(Box<dyn Partitioner>),
    Multi(Box<dyn MultiColumnPartitioner>),
}

impl PartitionAlgorithm {
    pub fn capability(&self) -> &'static str {
        match self {
            PartitionAlgorithm::Single(_) => "single-column",
            PartitionAlgorithm::Multi(_) => "multi-column",
        }
    }
}

impl std::fmt::Debug for PartitionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartitionAlgorithm({})", self.capability())
    }
}

/// Constructor closure: builds an algorithm instance from its bean-style
/// property bag.
pub type AlgorithmCtor =
    Arc<dyn Fn(&BTreeMap<String, String>) -> Result<PartitionAlgorithm, RuleError> + Send + Sync>;

/// Name → constructor map, consulted once per table rule at config load.
pub struct PartitionerRegistry {
    ctors: DashMap<String, AlgorithmCtor>,
}

impl Default for PartitionerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PartitionerRegistry {
    pub fn new() -> Self {
        Self {
            ctors: DashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in algorithms.
    pub fn with_builtins() -> Self {
        let reg = Self::new();
        reg.register("hash", |props| {
            Ok(PartitionAlgorithm::Single(Box::new(HashPartitioner::from_props(props)?)))
        });
        reg.register("mod", |props| {
            Ok(PartitionAlgorithm::Single(Box::new(ModPartitioner::from_props(props)?)))
        });
        reg.register("range", |props| {
            Ok(PartitionAlgorithm::Single(Box::new(RangePartitioner::from_props(props)?)))
        });
        reg.register("multi-hash", |props| {
            Ok(PartitionAlgorithm::Multi(Box::new(MultiColumnHashPartitioner::from_props(
                props,
            )?)))
        });
        reg
    }

    pub fn register<F>(&self, name: &str, ctor: F)
    where
        F: Fn(&BTreeMap<String, String>) -> Result<PartitionAlgorithm, RuleError>
            + Send
            + Sync
            + 'static,
    {
        self.ctors.insert(name.to_string(), Arc::new(ctor));
    }

    /// Resolve and construct a named algorithm. Unknown names and rejected
    /// properties are config-load-time failures.
    pub fn build(
        &self,
        name: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<PartitionAlgorithm, RuleError> {
        let ctor = self
            .ctors
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuleError::UnknownAlgorithm(name.to_string()))?;
        (*ctor)(props)
    }
}

fn required_usize(
    algorithm: &str,
    props: &BTreeMap<String, String>,
    key: &str,
) -> Result<usize, RuleError> {
    let raw = props.get(key).ok_or_else(|| RuleError::BadProperty {
        algorithm: algorithm.to_string(),
        property: key.to_string(),
        reason: "missing".into(),
    })?;
    raw.parse::<usize>().map_err(|e| RuleError::BadProperty {
        algorithm: algorithm.to_string(),
        property: key.to_string(),
        reason: e.to_string(),
    })
}

// ── Built-in algorithms ──────────────────────────────────────────────────────

/// xxHash3 over the value's stable binary encoding, modulo partition count.
/// Uniform for any datum type; cannot prune ranges.
pub struct HashPartitioner {
    partitions: usize,
}

impl HashPartitioner {
    pub fn new(partitions: usize) -> Self {
        Self { partitions }
    }

    fn from_props(props: &BTreeMap<String, String>) -> Result<Self, RuleError> {
        Ok(Self::new(required_usize("hash", props, "partitions")?))
    }
}

impl Partitioner for HashPartitioner {
    fn partition(&self, values: &[Datum]) -> Vec<i64> {
        values
            .iter()
            .map(|v| {
                let mut buf = Vec::with_capacity(16);
                v.encode_for_hash(&mut buf);
                (xxh3_64(&buf) % self.partitions as u64) as i64
            })
            .collect()
    }
}

/// Integer value modulo partition count. Non-integer values fall back to
/// the hash of their encoding, so mixed-type columns still route
/// deterministically.
pub struct ModPartitioner {
    partitions: usize,
}

impl ModPartitioner {
    pub fn new(partitions: usize) -> Self {
        Self { partitions }
    }

    fn from_props(props: &BTreeMap<String, String>) -> Result<Self, RuleError> {
        Ok(Self::new(required_usize("mod", props, "partitions")?))
    }
}

impl Partitioner for ModPartitioner {
    fn partition(&self, values: &[Datum]) -> Vec<i64> {
        values
            .iter()
            .map(|v| match v.as_i64() {
                Some(i) => i.rem_euclid(self.partitions as i64),
                None => {
                    let mut buf = Vec::with_capacity(16);
                    v.encode_for_hash(&mut buf);
                    (xxh3_64(&buf) % self.partitions as u64) as i64
                }
            })
            .collect()
    }
}

/// Ordered split points: partition i holds values in
/// `(split[i-1], split[i]]`, with the last partition unbounded above.
/// Supports contiguous range pruning.
pub struct RangePartitioner {
    /// Ascending upper bounds; partition count = splits.len() + 1.
    splits: Vec<Datum>,
}

impl RangePartitioner {
    pub fn new(splits: Vec<Datum>) -> Self {
        Self { splits }
    }

    fn from_props(props: &BTreeMap<String, String>) -> Result<Self, RuleError> {
        let raw = props.get("splits").ok_or_else(|| RuleError::BadProperty {
            algorithm: "range".into(),
            property: "splits".into(),
            reason: "missing".into(),
        })?;
        let mut splits = Vec::new();
        for part in raw.split(',') {
            let trimmed = part.trim();
            let value = trimmed
                .parse::<i64>()
                .map(Datum::Int64)
                .unwrap_or_else(|_| Datum::Text(trimmed.to_string()));
            splits.push(value);
        }
        Ok(Self::new(splits))
    }

    fn locate(&self, value: &Datum) -> i64 {
        // First split point >= value wins; above all splits → last partition.
        self.splits.partition_point(|s| s < value) as i64
    }
}

impl Partitioner for RangePartitioner {
    fn partition(&self, values: &[Datum]) -> Vec<i64> {
        values.iter().map(|v| self.locate(v)).collect()
    }

    fn partition_range(&self, start: Option<&Datum>, end: Option<&Datum>) -> Option<Vec<i64>> {
        let lo = start.map(|v| self.locate(v)).unwrap_or(0);
        let hi = end
            .map(|v| self.locate(v))
            .unwrap_or(self.splits.len() as i64);
        Some((lo..=hi).collect())
    }
}

/// Multi-column capability: xxHash3 over the concatenation of every rule
/// column's fixed value. Any column without a fixed single value forces a
/// broadcast (empty prune), signalled by returning one index per
/// cross-product combination of the fixed value sets.
pub struct MultiColumnHashPartitioner {
    partitions: usize,
}

impl MultiColumnHashPartitioner {
    pub fn new(partitions: usize) -> Self {
        Self { partitions }
    }

    fn from_props(props: &BTreeMap<String, String>) -> Result<Self, RuleError> {
        Ok(Self::new(required_usize("multi-hash", props, "partitions")?))
    }
}

impl MultiColumnPartitioner for MultiColumnHashPartitioner {
    fn partition(&self, arguments: &[RoutingArgument]) -> Vec<i64> {
        // Cross-product of the per-column fixed value sets; a None or Range
        // argument cannot be combined into a single hash, so the whole set
        // of partitions is returned (caller-visible broadcast).
        let mut combos: Vec<Vec<&Datum>> = vec![Vec::new()];
        for arg in arguments {
            match &arg.kind {
                ArgumentKind::Fixed(values) if !values.is_empty() => {
                    let mut next = Vec::with_capacity(combos.len() * values.len());
                    for combo in &combos {
                        for v in values {
                            let mut c = combo.clone();
                            c.push(v);
                            next.push(c);
                        }
                    }
                    combos = next;
                }
                _ => return (0..self.partitions as i64).collect(),
            }
        }
        combos
            .iter()
            .map(|combo| {
                let mut buf = Vec::with_capacity(32);
                for v in combo {
                    v.encode_for_hash(&mut buf);
                }
                (xxh3_64(&buf) % self.partitions as u64) as i64
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── registry ─────────────────────────────────────────────────────────

    #[test]
    fn test_registry_resolves_builtins() {
        let reg = PartitionerRegistry::with_builtins();
        let alg = reg.build("mod", &props(&[("partitions", "3")])).unwrap();
        assert_eq!(alg.capability(), "single-column");
        let alg = reg.build("multi-hash", &props(&[("partitions", "4")])).unwrap();
        assert_eq!(alg.capability(), "multi-column");
    }

    #[test]
    fn test_registry_unknown_name() {
        let reg = PartitionerRegistry::with_builtins();
        let err = reg.build("nope", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RuleError::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_registry_bad_property() {
        let reg = PartitionerRegistry::with_builtins();
        let err = reg.build("mod", &props(&[("partitions", "many")])).unwrap_err();
        assert!(matches!(err, RuleError::BadProperty { .. }));
    }

    #[test]
    fn test_registry_accepts_user_algorithm() {
        struct Fixed7;
        impl Partitioner for Fixed7 {
            fn partition(&self, values: &[Datum]) -> Vec<i64> {
                values.iter().map(|_| 7).collect()
            }
        }
        let reg = PartitionerRegistry::with_builtins();
        reg.register("fixed7", |_| Ok(PartitionAlgorithm::Single(Box::new(Fixed7))));
        let alg = reg.build("fixed7", &BTreeMap::new()).unwrap();
        match alg {
            PartitionAlgorithm::Single(p) => assert_eq!(p.partition(&[Datum::Int64(1)]), vec![7]),
            _ => panic!("expected single-column"),
        }
    }

    // ── mod ──────────────────────────────────────────────────────────────

    #[test]
    fn test_mod_partitioner() {
        let p = ModPartitioner::new(3);
        assert_eq!(
            p.partition(&[Datum::Int64(1), Datum::Int64(4), Datum::Int64(7)]),
            vec![1, 1, 1]
        );
        assert_eq!(p.partition(&[Datum::Int64(-1)]), vec![2]); // euclidean
    }

    #[test]
    fn test_mod_partitioner_no_range_pruning() {
        let p = ModPartitioner::new(3);
        assert!(p
            .partition_range(Some(&Datum::Int64(1)), Some(&Datum::Int64(5)))
            .is_none());
    }

    // ── hash ─────────────────────────────────────────────────────────────

    #[test]
    fn test_hash_partitioner_deterministic_and_in_range() {
        let p = HashPartitioner::new(5);
        let a = p.partition(&[Datum::Text("k1".into()), Datum::Int64(42)]);
        let b = p.partition(&[Datum::Text("k1".into()), Datum::Int64(42)]);
        assert_eq!(a, b);
        assert!(a.iter().all(|&i| (0..5).contains(&i)));
    }

    // ── range ────────────────────────────────────────────────────────────

    #[test]
    fn test_range_partitioner_point_lookup() {
        // splits [100, 200]: p0 = (..100], p1 = (100..200], p2 = (200..)
        let p = RangePartitioner::new(vec![Datum::Int64(100), Datum::Int64(200)]);
        assert_eq!(p.partition(&[Datum::Int64(50)]), vec![0]);
        assert_eq!(p.partition(&[Datum::Int64(100)]), vec![0]);
        assert_eq!(p.partition(&[Datum::Int64(150)]), vec![1]);
        assert_eq!(p.partition(&[Datum::Int64(500)]), vec![2]);
    }

    #[test]
    fn test_range_partitioner_span() {
        let p = RangePartitioner::new(vec![Datum::Int64(100), Datum::Int64(200)]);
        assert_eq!(
            p.partition_range(Some(&Datum::Int64(50)), Some(&Datum::Int64(150))),
            Some(vec![0, 1])
        );
        assert_eq!(
            p.partition_range(Some(&Datum::Int64(150)), None),
            Some(vec![1, 2])
        );
        assert_eq!(
            p.partition_range(None, None),
            Some(vec![0, 1, 2])
        );
    }

    // ── multi-hash ───────────────────────────────────────────────────────

    #[test]
    fn test_multi_hash_cross_product() {
        let p = MultiColumnHashPartitioner::new(8);
        let args = vec![
            RoutingArgument::fixed("a", vec![Datum::Int64(1), Datum::Int64(2)]),
            RoutingArgument::fixed("b", vec![Datum::Text("x".into())]),
        ];
        let out = p.partition(&args);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|&i| (0..8).contains(&i)));
    }

    #[test]
    fn test_multi_hash_broadcasts_on_unbounded_column() {
        let p = MultiColumnHashPartitioner::new(4);
        let args = vec![
            RoutingArgument::fixed("a", vec![Datum::Int64(1)]),
            RoutingArgument::none("b"),
        ];
        assert_eq!(p.partition(&args), vec![0, 1, 2, 3]);
    }
}
