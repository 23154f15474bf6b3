//! Deriving a sparse attribute-change log from snapshot histories.
//!
//! The snapshot table stores the full state of an object at every version;
//! the change log stores only the deltas. For each object the first
//! snapshot emits one change per present attribute, and every later
//! snapshot emits a change only for values that are present *and* differ
//! from the last observed value (forward-fill semantics: a value is never
//! considered unset once observed, so present-to-missing emits nothing).

use crate::model::{AttributeChange, ObjectSnapshot};
use std::collections::BTreeMap;

/// Derive the attribute-change log from a snapshot history.
///
/// Output is ordered by `(object_id, timestamp, field)` ascending, ties
/// broken by input order. Downstream consumers rely on this ordering being
/// deterministic for identical input — it is a stability contract.
pub fn derive_changes(snapshots: &[ObjectSnapshot]) -> Vec<AttributeChange> {
    let mut by_object: BTreeMap<&str, Vec<&ObjectSnapshot>> = BTreeMap::new();
    for snap in snapshots {
        by_object.entry(snap.object_id.as_str()).or_default().push(snap);
    }

    let mut out = Vec::new();
    for history in by_object.values_mut() {
        history.sort_by_key(|s| s.valid_from);

        // Forward-fill state: last observed value per attribute.
        let mut seen: BTreeMap<&str, &crate::model::AttributeValue> = BTreeMap::new();
        for snap in history.iter() {
            for (name, value) in &snap.attributes {
                let changed = match seen.get(name.as_str()) {
                    None => true,
                    Some(previous) => *previous != value,
                };
                if changed {
                    out.push(AttributeChange {
                        object_id: snap.object_id.clone(),
                        object_type: snap.object_type.clone(),
                        timestamp: snap.valid_from,
                        field: name.clone(),
                        value: value.clone(),
                    });
                    seen.insert(name.as_str(), value);
                }
            }
        }
    }

    // Snapshots sharing a valid_from can interleave fields; restore the
    // (object, time, field) contract with a stable sort.
    out.sort_by(|a, b| {
        (a.object_id.as_str(), a.timestamp, a.field.as_str())
            .cmp(&(b.object_id.as_str(), b.timestamp, b.field.as_str()))
    });
    out
}
