//! Deep traversal for `deep` watchers.
//!
//! Reads every property and element reachable from a value through the
//! tracked accessors, so the evaluating watcher ends up subscribed to all
//! nested state. Containers are visited once per traversal, keyed by
//! identity, which keeps cyclic data finite.

use std::collections::HashSet;

use super::value::Value;

/// Touch everything reachable from `value`.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if obj.is_frozen() || !seen.insert(obj.addr()) {
                return;
            }
            for key in obj.keys() {
                walk(&obj.get(&key), seen);
            }
        }
        Value::Array(array) => {
            if array.is_frozen() || !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
