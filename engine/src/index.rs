//! Secondary indexes and key ranges.

use crate::{error::Result, record::Record, schema::IndexDef, Error, RecordKey};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// A JSON value with a total order, usable as an index key.
///
/// Values of different types order as
/// `null < bool < number < string < array < object`.
#[derive(Debug, Clone)]
pub struct IndexKey(pub Value);

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => {
            let a = serde_json::to_string(a).unwrap_or_default();
            let b = serde_json::to_string(b).unwrap_or_default();
            a.cmp(&b)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

/// A range over index keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    lower: Bound<IndexKey>,
    upper: Bound<IndexKey>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly `value`.
    pub fn only(value: impl Into<Value>) -> Self {
        let key = IndexKey(value.into());
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys strictly greater than `value`.
    pub fn gt(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Excluded(IndexKey(value.into())),
            upper: Bound::Unbounded,
        }
    }

    /// Keys greater than or equal to `value`.
    pub fn gte(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Included(IndexKey(value.into())),
            upper: Bound::Unbounded,
        }
    }

    /// Keys strictly less than `value`.
    pub fn lt(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(IndexKey(value.into())),
        }
    }

    /// Keys less than or equal to `value`.
    pub fn lte(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Included(IndexKey(value.into())),
        }
    }

    /// Keys between `lower` and `upper`, bounds included or not.
    pub fn between(
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        let lower = IndexKey(lower.into());
        let upper = IndexKey(upper.into());
        Self {
            lower: if lower_open {
                Bound::Excluded(lower)
            } else {
                Bound::Included(lower)
            },
            upper: if upper_open {
                Bound::Excluded(upper)
            } else {
                Bound::Included(upper)
            },
        }
    }

    /// Whether `key` falls inside this range.
    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Ranges whose bounds cross select nothing. `BTreeMap::range` panics
    /// on those, so they are filtered out first.
    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u)) => l >= u,
            (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

/// One secondary index: index value to the keys of the records holding it.
#[derive(Debug, Clone)]
pub(crate) struct Index {
    def: IndexDef,
    entries: BTreeMap<IndexKey, BTreeSet<RecordKey>>,
}

impl Index {
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Fail if adding `record` under `key` would break uniqueness.
    pub fn check(&self, key: &str, record: &Record) -> Result<()> {
        if !self.def.unique {
            return Ok(());
        }
        let Some(value) = record.index_value(&self.def.key_path) else {
            return Ok(());
        };
        match self.entries.get(&IndexKey(value)) {
            Some(holders) if holders.iter().any(|k| k != key) => Err(Error::ConstraintViolation {
                index: self.def.name.clone(),
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, key: &str, record: &Record) {
        if let Some(value) = record.index_value(&self.def.key_path) {
            self.entries
                .entry(IndexKey(value))
                .or_default()
                .insert(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str, record: &Record) {
        if let Some(value) = record.index_value(&self.def.key_path) {
            let index_key = IndexKey(value);
            if let Some(holders) = self.entries.get_mut(&index_key) {
                holders.remove(key);
                if holders.is_empty() {
                    self.entries.remove(&index_key);
                }
            }
        }
    }

    /// Record keys under exactly `value`, in key order.
    pub fn lookup(&self, value: &Value) -> Vec<RecordKey> {
        self.entries
            .get(&IndexKey(value.clone()))
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record keys inside `range`, in index order.
    pub fn scan(&self, range: &KeyRange) -> Vec<RecordKey> {
        if range.is_empty() {
            return Vec::new();
        }
        self.entries
            .range((range.lower.clone(), range.upper.clone()))
            .flat_map(|(_, holders)| holders.iter().cloned())
            .collect()
    }
}
