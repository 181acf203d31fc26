//! Parameter usage counters and duplicate-binding diagnostics

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::value::Value;

/// How often each parameter path was resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    counts: BTreeMap<String, u64>,
}

impl Stats {
    /// Create an empty counter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all counts
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Count one successful resolution of `path`
    pub fn record(&mut self, path: &str) {
        *self.counts.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Number of times `path` was resolved
    pub fn get(&self, path: &str) -> u64 {
        self.counts.get(path).copied().unwrap_or(0)
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate counts ordered by path
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Counts as a JSON object, ordered by path
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.counts
                .iter()
                .map(|(k, v)| (k.clone(), Value::Number(*v as f64)))
                .collect(),
        )
    }
}

/// Leaf values that appear under the same field name in more than one place.
///
/// Every object scope is walked down to its non-object leaves. Leaves are
/// grouped by their own field name only, not by the dotted path leading to
/// them, so `a.port` and `b.port` count as the same parameter. Names recorded
/// more than once are returned together with every value seen, in scope order.
pub fn find_duplicates(scopes: &[&Value]) -> IndexMap<String, Vec<Value>> {
    let mut leaves: IndexMap<String, Vec<Value>> = IndexMap::new();
    for scope in scopes {
        if let Value::Object(map) = scope {
            collect_leaves(map, &mut leaves);
        }
    }
    leaves.retain(|_, values| values.len() > 1);
    leaves
}

fn collect_leaves(map: &IndexMap<String, Value>, leaves: &mut IndexMap<String, Vec<Value>>) {
    for (name, value) in map {
        match value {
            Value::Object(inner) => collect_leaves(inner, leaves),
            leaf => leaves.entry(name.clone()).or_default().push(leaf.clone()),
        }
    }
}
