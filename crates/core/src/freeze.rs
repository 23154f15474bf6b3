//! Freezing: collapsing a temporal log into a flat, type-consistent one.
//!
//! Two terminal modes, selected by [`FreezeMode`]:
//!
//! - **Snapshot** (`At(t)`): every object is projected to the snapshot
//!   valid at `t` (as-of rule, earliest-record fallback). The change log
//!   keeps the *full* un-truncated history, but every record's object
//!   type is rewritten to the type resolved at `t`. No synthetic type.
//!
//! - **Global**: objects whose type changes over time ("dynamic" objects)
//!   are assigned one reserved synthetic type everywhere, their last real
//!   type is stored under a dedicated type-history attribute, and the
//!   change log gains one entry per type transition (the first observed
//!   type included).
//!
//! Either way the output satisfies one invariant: every relation that
//! mentions an object id agrees on exactly one object type for it.

use crate::changes::derive_changes;
use crate::model::{
    AttributeChange, AttributeValue, EventObjectLink, FlatLog, FlatObject, ObjectObjectLink,
    TemporalLog,
};
use crate::resolve::AsOfIndex;
use crate::{PermafrostError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// How to collapse the temporal dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeMode {
    /// Snapshot freezing at a concrete instant.
    At(DateTime<Utc>),
    /// Global freezing: preserve dynamic-type history via a synthetic
    /// supertype and an attribute-history trail.
    Global,
}

impl FreezeMode {
    /// Convenience: parse a timestamp literal into snapshot mode.
    pub fn at(literal: &str) -> Result<Self> {
        Ok(FreezeMode::At(crate::schema::parse_instant(literal)?))
    }
}

/// Labels used by global freezing.
#[derive(Debug, Clone)]
pub struct FreezeOptions {
    /// Synthetic type assigned to dynamic objects.
    pub dynamic_type_label: String,
    /// Attribute under which the real type (and its evolution) is kept.
    pub type_history_attribute: String,
}

impl Default for FreezeOptions {
    fn default() -> Self {
        Self {
            dynamic_type_label: "dynamic".to_string(),
            type_history_attribute: "__type_history".to_string(),
        }
    }
}

/// Freeze a temporal log into a flat one.
///
/// Fails with [`PermafrostError::EmptyModel`] when the object relation is
/// empty — there is nothing to freeze, and a retry would reproduce the
/// same failure.
pub fn freeze(log: &TemporalLog, mode: FreezeMode, options: &FreezeOptions) -> Result<FlatLog> {
    if log.objects.is_empty() {
        return Err(PermafrostError::EmptyModel(
            "object relation is missing or empty; nothing to freeze".to_string(),
        ));
    }

    debug!(
        "freezing {} snapshots / {} events ({:?})",
        log.objects.len(),
        log.events.len(),
        mode
    );

    let events = log.events.clone();
    // Snapshot references do not survive freezing.
    let e2o: Vec<EventObjectLink> = log
        .e2o
        .iter()
        .map(|link| {
            let mut link = link.clone();
            link.snapshot_id = None;
            link
        })
        .collect();
    let o2o = collapse_o2o(&log.o2o);

    // The full audit trail survives freezing un-truncated.
    let mut changes = derive_changes(&log.objects);

    let index: AsOfIndex<&crate::model::ObjectSnapshot> = AsOfIndex::from_stream(
        log.objects
            .iter()
            .map(|snap| (snap.object_id.clone(), snap.valid_from, snap)),
    );

    match mode {
        FreezeMode::At(t) => {
            let mut objects = Vec::new();
            let mut type_at_t: BTreeMap<String, String> = BTreeMap::new();
            for (object_id, snap) in index.resolve_all(t) {
                objects.push(FlatObject {
                    object_id: object_id.to_string(),
                    object_type: snap.object_type.clone(),
                    attributes: snap.attributes.clone(),
                });
                type_at_t.insert(object_id.to_string(), snap.object_type.clone());
            }

            for change in &mut changes {
                if let Some(resolved) = type_at_t.get(&change.object_id) {
                    change.object_type = resolved.clone();
                }
            }
            let e2o = e2o
                .into_iter()
                .map(|mut link| {
                    if link.object_type.is_some() {
                        if let Some(resolved) = type_at_t.get(&link.object_id) {
                            link.object_type = Some(resolved.clone());
                        }
                    }
                    link
                })
                .collect();
            let o2o = o2o
                .into_iter()
                .map(|mut link| {
                    if link.source_type.is_some() {
                        if let Some(resolved) = type_at_t.get(&link.source_id) {
                            link.source_type = Some(resolved.clone());
                        }
                    }
                    if link.target_type.is_some() {
                        if let Some(resolved) = type_at_t.get(&link.target_id) {
                            link.target_type = Some(resolved.clone());
                        }
                    }
                    link
                })
                .collect();

            Ok(FlatLog {
                events,
                objects,
                e2o,
                o2o,
                changes,
            })
        }

        FreezeMode::Global => {
            let dynamic = log.dynamic_objects();
            debug!("{} dynamic objects", dynamic.len());

            let mut objects = Vec::new();
            for object_id in index.object_ids() {
                let Some(last) = index.last_value(object_id) else {
                    continue;
                };
                let is_dynamic = dynamic.contains(object_id);
                let mut flat = FlatObject {
                    object_id: object_id.to_string(),
                    object_type: if is_dynamic {
                        options.dynamic_type_label.clone()
                    } else {
                        last.object_type.clone()
                    },
                    attributes: last.attributes.clone(),
                };
                if is_dynamic {
                    // Last real type; the evolution lives in the change log.
                    flat.attributes.insert(
                        options.type_history_attribute.clone(),
                        AttributeValue::Text(last.object_type.trim().to_string()),
                    );
                }
                objects.push(flat);
            }

            append_type_history(&mut changes, log, &dynamic, &options.type_history_attribute);

            for change in &mut changes {
                if dynamic.contains(&change.object_id) {
                    change.object_type = options.dynamic_type_label.clone();
                }
            }
            let e2o = e2o
                .into_iter()
                .map(|mut link| {
                    if link.object_type.is_some() && dynamic.contains(&link.object_id) {
                        link.object_type = Some(options.dynamic_type_label.clone());
                    }
                    link
                })
                .collect();
            let o2o = o2o
                .into_iter()
                .map(|mut link| {
                    if link.source_type.is_some() && dynamic.contains(&link.source_id) {
                        link.source_type = Some(options.dynamic_type_label.clone());
                    }
                    if link.target_type.is_some() && dynamic.contains(&link.target_id) {
                        link.target_type = Some(options.dynamic_type_label.clone());
                    }
                    link
                })
                .collect();

            changes.sort_by(|a, b| {
                (a.object_id.as_str(), a.timestamp, a.field.as_str())
                    .cmp(&(b.object_id.as_str(), b.timestamp, b.field.as_str()))
            });

            Ok(FlatLog {
                events,
                objects,
                e2o,
                o2o,
                changes,
            })
        }
    }
}

/// Collapse a temporally-versioned o2o relation to a plain union of
/// links: validity and snapshot columns dropped, duplicates (same source,
/// target, qualifier) removed, first occurrence kept.
fn collapse_o2o(links: &[ObjectObjectLink]) -> Vec<ObjectObjectLink> {
    let mut seen: BTreeSet<(String, String, Option<String>)> = BTreeSet::new();
    let mut out = Vec::new();
    for link in links {
        let key = (
            link.source_id.clone(),
            link.target_id.clone(),
            link.qualifier.clone(),
        );
        if seen.insert(key) {
            let mut link = link.clone();
            link.valid_from = None;
            link.valid_to = None;
            link.source_snapshot_id = None;
            link.target_snapshot_id = None;
            out.push(link);
        }
    }
    out
}

/// Emit one change per type transition of each dynamic object, the first
/// observed type included, stamped with the introducing snapshot's
/// `valid_from` and recorded under the type-history attribute.
fn append_type_history(
    changes: &mut Vec<AttributeChange>,
    log: &TemporalLog,
    dynamic: &BTreeSet<String>,
    type_history_attribute: &str,
) {
    for (object_id, history) in log.snapshots_by_object() {
        if !dynamic.contains(object_id) {
            continue;
        }
        let mut previous: Option<&str> = None;
        for snap in history {
            let current = snap.object_type.trim();
            if previous != Some(current) {
                changes.push(AttributeChange {
                    object_id: object_id.to_string(),
                    object_type: snap.object_type.clone(),
                    timestamp: snap.valid_from,
                    field: type_history_attribute.to_string(),
                    value: AttributeValue::Text(current.to_string()),
                });
                previous = Some(current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectSnapshot;

    fn dt(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    /// o1 changes type A -> B; o2 stays C throughout.
    fn fixture() -> TemporalLog {
        TemporalLog {
            events: vec![crate::model::Event::new("e1", "create", dt("2024-01-01T10:00:00Z"))],
            objects: vec![
                ObjectSnapshot::new("o1", "A", dt("2024-01-01T00:00:00Z"))
                    .with_attr("priority", "low"),
                ObjectSnapshot::new("o1", "B", dt("2024-03-01T00:00:00Z"))
                    .with_attr("priority", "high"),
                ObjectSnapshot::new("o2", "C", dt("2024-01-01T00:00:00Z")),
            ],
            e2o: vec![{
                let mut l = EventObjectLink::new("e1", "o1");
                l.event_type = Some("create".to_string());
                l.timestamp = Some(dt("2024-01-01T10:00:00Z"));
                l.object_type = Some("A".to_string());
                l
            }],
            o2o: vec![
                {
                    let mut l = ObjectObjectLink::new("o1", "o2").with_qualifier("contains");
                    l.source_type = Some("A".to_string());
                    l.target_type = Some("C".to_string());
                    l.valid_from = Some(dt("2024-01-01T00:00:00Z"));
                    l
                },
                {
                    // Later version of the same relationship.
                    let mut l = ObjectObjectLink::new("o1", "o2").with_qualifier("contains");
                    l.source_type = Some("B".to_string());
                    l.target_type = Some("C".to_string());
                    l.valid_from = Some(dt("2024-03-01T00:00:00Z"));
                    l
                },
            ],
        }
    }

    #[test]
    fn empty_model_is_an_error() {
        let log = TemporalLog::default();
        let err = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap_err();
        assert!(matches!(err, PermafrostError::EmptyModel(_)));
    }

    #[test]
    fn snapshot_mode_resolves_type_at_t_everywhere() {
        let log = fixture();
        // t1 between the two o1 snapshots: type A wins.
        let flat = freeze(
            &log,
            FreezeMode::At(dt("2024-02-01T00:00:00Z")),
            &FreezeOptions::default(),
        )
        .unwrap();

        let o1 = flat.object("o1").unwrap();
        assert_eq!(o1.object_type, "A");
        assert_eq!(o1.attributes["priority"], AttributeValue::from("low"));

        // The change log keeps the full history, but under the resolved type.
        let o1_changes: Vec<_> = flat.changes.iter().filter(|c| c.object_id == "o1").collect();
        assert_eq!(o1_changes.len(), 2);
        assert!(o1_changes.iter().all(|c| c.object_type == "A"));

        assert_eq!(flat.e2o[0].object_type.as_deref(), Some("A"));
        assert_eq!(flat.o2o[0].source_type.as_deref(), Some("A"));
        // No synthetic type in snapshot mode.
        assert!(flat.objects.iter().all(|o| o.object_type != "dynamic"));
    }

    #[test]
    fn snapshot_mode_falls_back_to_earliest_snapshot() {
        let log = fixture();
        let mode = FreezeMode::at("2023-01-01T00:00:00Z").unwrap();
        let flat = freeze(&log, mode, &FreezeOptions::default()).unwrap();
        // Query precedes every snapshot: earliest record still resolves.
        assert_eq!(flat.object("o1").unwrap().object_type, "A");
        assert_eq!(flat.objects.len(), 2);
    }

    #[test]
    fn global_mode_assigns_synthetic_type_and_history_trail() {
        let log = fixture();
        let opts = FreezeOptions::default();
        let flat = freeze(&log, FreezeMode::Global, &opts).unwrap();

        let o1 = flat.object("o1").unwrap();
        assert_eq!(o1.object_type, "dynamic");
        // Last observed real type lives in the history attribute.
        assert_eq!(
            o1.attributes[&opts.type_history_attribute],
            AttributeValue::from("B")
        );
        // Static object keeps its real type.
        assert_eq!(flat.object("o2").unwrap().object_type, "C");

        // Two type transitions recorded, first type included.
        let trail: Vec<_> = flat
            .changes
            .iter()
            .filter(|c| c.field == opts.type_history_attribute)
            .collect();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].timestamp, dt("2024-01-01T00:00:00Z"));
        assert_eq!(trail[0].value, AttributeValue::from("A"));
        assert_eq!(trail[1].timestamp, dt("2024-03-01T00:00:00Z"));
        assert_eq!(trail[1].value, AttributeValue::from("B"));
        // Trail rows carry the synthetic type like every other relation.
        assert!(trail.iter().all(|c| c.object_type == "dynamic"));

        assert_eq!(flat.e2o[0].object_type.as_deref(), Some("dynamic"));
        assert_eq!(flat.o2o[0].source_type.as_deref(), Some("dynamic"));
        assert_eq!(flat.o2o[0].target_type.as_deref(), Some("C"));
    }

    #[test]
    fn o2o_collapses_to_a_union_of_links() {
        let log = fixture();
        let flat = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap();
        // Two temporal versions of the same (source, target, qualifier).
        assert_eq!(flat.o2o.len(), 1);
        assert!(flat.o2o[0].valid_from.is_none());
        assert!(flat.o2o[0].valid_to.is_none());
    }

    #[test]
    fn type_consistency_invariant_holds_in_both_modes() {
        let log = fixture();
        for mode in [FreezeMode::Global, FreezeMode::At(dt("2024-06-01T00:00:00Z"))] {
            let flat = freeze(&log, mode, &FreezeOptions::default()).unwrap();
            let mut types: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            for o in &flat.objects {
                types.entry(&o.object_id).or_default().insert(&o.object_type);
            }
            for c in &flat.changes {
                types.entry(&c.object_id).or_default().insert(&c.object_type);
            }
            for l in &flat.e2o {
                if let Some(t) = &l.object_type {
                    types.entry(&l.object_id).or_default().insert(t);
                }
            }
            for l in &flat.o2o {
                if let Some(t) = &l.source_type {
                    types.entry(&l.source_id).or_default().insert(t);
                }
                if let Some(t) = &l.target_type {
                    types.entry(&l.target_id).or_default().insert(t);
                }
            }
            for (oid, seen) in types {
                assert_eq!(seen.len(), 1, "object {oid} has conflicting types: {seen:?}");
            }
        }
    }

    #[test]
    fn inputs_are_left_untouched() {
        let log = fixture();
        let before = log.clone();
        let _ = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap();
        assert_eq!(log, before);
    }
}
