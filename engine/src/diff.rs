//! Structural diff and patch over JSON objects.
//!
//! A [`Diff`] lists the keys to set, the keys to remove and per-key nested
//! diffs for objects present on both sides. Arrays and scalars are replaced
//! wholesale. `patch(old, diff(old, new)) == new` for any pair of objects.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MAX_DIFF_DEPTH: usize = 100;

/// Difference between two JSON objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff {
    /// Keys added or replaced, with their new values
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    /// Keys removed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
    /// Nested diffs for objects present on both sides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<String, Diff>,
}

impl Diff {
    /// Whether applying this diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.nested.is_empty()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Compute the diff turning `old` into `new`. Both must be objects.
pub fn diff(old: &Value, new: &Value) -> Result<Diff> {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => diff_maps(old, new),
        _ => Err(Error::Patch("diff requires two JSON objects".into())),
    }
}

/// Compute the diff between two object maps.
pub fn diff_maps(old: &Map<String, Value>, new: &Map<String, Value>) -> Result<Diff> {
    diff_node(old, new, 0)
}

/// Apply `diff` to an object value in place.
pub fn patch(value: &mut Value, diff: &Diff) -> Result<()> {
    match value {
        Value::Object(map) => patch_map(map, diff),
        _ => Err(Error::Patch("target is not a JSON object".into())),
    }
}

/// Apply `diff` to an object map in place.
pub fn patch_map(map: &mut Map<String, Value>, diff: &Diff) -> Result<()> {
    patch_node(map, diff, 0)
}

// ============================================================================
// Core logic
// ============================================================================

fn diff_node(old: &Map<String, Value>, new: &Map<String, Value>, depth: usize) -> Result<Diff> {
    if depth > MAX_DIFF_DEPTH {
        return Err(Error::DiffDepth(MAX_DIFF_DEPTH));
    }

    let mut result = Diff::default();

    for (key, new_value) in new {
        match (old.get(key), new_value) {
            (None, _) => {
                result.set.insert(key.clone(), new_value.clone());
            }
            (Some(Value::Object(old_obj)), Value::Object(new_obj)) => {
                let inner = diff_node(old_obj, new_obj, depth + 1)?;
                if !inner.is_empty() {
                    result.nested.insert(key.clone(), inner);
                }
            }
            (Some(old_value), _) if old_value != new_value => {
                result.set.insert(key.clone(), new_value.clone());
            }
            _ => {}
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            result.unset.push(key.clone());
        }
    }

    Ok(result)
}

fn patch_node(map: &mut Map<String, Value>, diff: &Diff, depth: usize) -> Result<()> {
    if depth > MAX_DIFF_DEPTH {
        return Err(Error::DiffDepth(MAX_DIFF_DEPTH));
    }

    for key in &diff.unset {
        map.remove(key);
    }

    for (key, value) in &diff.set {
        map.insert(key.clone(), value.clone());
    }

    for (key, inner) in &diff.nested {
        match map.get_mut(key) {
            Some(Value::Object(child)) => patch_node(child, inner, depth + 1)?,
            Some(_) => {
                return Err(Error::Patch(format!("field '{key}' is not an object")));
            }
            None => {
                return Err(Error::Patch(format!("field '{key}' is missing")));
            }
        }
    }

    Ok(())
}
