//! OLAP rewriting: drill-down / roll-up over object types, unfold / fold
//! over event types.
//!
//! Drill-down specializes a base type into composite labels
//! `(base,value)` driven by an attribute of the object; roll-up is its
//! inverse and collapses any `(base,*)` label back to the base type,
//! independent of which mode produced it. Both act on a copy of the input
//! log and never mutate the caller's relations.
//!
//! In history-aware mode the attribute value is resolved as-of each
//! relation's own timestamp via [`AsOfIndex`] built from the attribute's
//! change stream; relations without a timestamp (the object table, the
//! change log, collapsed o2o links) use the last known value. Rows whose
//! value resolves to missing keep the base type.

use crate::model::{AttributeValue, FlatLog};
use crate::resolve::AsOfIndex;
use crate::{PermafrostError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

fn composite(base: &str, value: &AttributeValue) -> String {
    format!("({base},{value})")
}

/// Does `label` match the composite pattern `(base,...)`?
fn is_composite_of(label: &str, base: &str) -> bool {
    label
        .strip_prefix('(')
        .and_then(|rest| rest.strip_prefix(base))
        .and_then(|rest| rest.strip_prefix(','))
        .is_some_and(|rest| rest.ends_with(')'))
}

/// Dimension-attribute values per object: the stored value from the
/// object table, optionally shadowed by the attribute's change stream.
struct AttributeLookup<'a> {
    stored: BTreeMap<&'a str, &'a AttributeValue>,
    history: Option<AsOfIndex<AttributeValue>>,
}

impl<'a> AttributeLookup<'a> {
    fn new(log: &'a FlatLog, attribute: &str, history_aware: bool) -> Self {
        let stored = log
            .objects
            .iter()
            .filter_map(|o| {
                o.attributes
                    .get(attribute)
                    .map(|v| (o.object_id.as_str(), v))
            })
            .collect();
        let history = history_aware.then(|| {
            AsOfIndex::from_stream(log.changes.iter().filter(|c| c.field == attribute).map(|c| {
                (c.object_id.clone(), c.timestamp, c.value.clone())
            }))
        });
        Self { stored, history }
    }

    /// Last known value, falling back to the stored attribute.
    fn last_known(&self, object_id: &str) -> Option<&AttributeValue> {
        match &self.history {
            Some(index) => index
                .last_value(object_id)
                .or_else(|| self.stored.get(object_id).copied()),
            None => self.stored.get(object_id).copied(),
        }
    }

    /// Value as-of `at` where a timestamp exists, last known otherwise.
    fn as_of(&self, object_id: &str, at: Option<DateTime<Utc>>) -> Option<&AttributeValue> {
        match (&self.history, at) {
            (Some(index), Some(at)) => index
                .value_at(object_id, at)
                .or_else(|| self.stored.get(object_id).copied()),
            _ => self.last_known(object_id),
        }
    }
}

/// Drill down on `base_type` by `attribute`: rewrite the type of matching
/// rows to `(base_type, value)` across every relation carrying a type
/// column. Rows whose value is missing keep `base_type`.
pub fn drill_down(
    log: &FlatLog,
    base_type: &str,
    attribute: &str,
    history_aware: bool,
) -> Result<FlatLog> {
    if log.objects.is_empty() {
        return Err(PermafrostError::EmptyModel(
            "object relation is empty; drill-down requires objects".to_string(),
        ));
    }
    debug!("drill-down {base_type} by {attribute} (history_aware={history_aware})");

    let lookup = AttributeLookup::new(log, attribute, history_aware);
    let mut out = log.clone();

    for object in &mut out.objects {
        if object.object_type == base_type {
            if let Some(value) = lookup.last_known(&object.object_id) {
                object.object_type = composite(base_type, value);
            }
        }
    }
    for link in &mut out.e2o {
        if link.object_type.as_deref() == Some(base_type) {
            if let Some(value) = lookup.as_of(&link.object_id, link.timestamp) {
                link.object_type = Some(composite(base_type, value));
            }
        }
    }
    for change in &mut out.changes {
        if change.object_type == base_type {
            if let Some(value) = lookup.last_known(&change.object_id) {
                change.object_type = composite(base_type, value);
            }
        }
    }
    for link in &mut out.o2o {
        if link.source_type.as_deref() == Some(base_type) {
            if let Some(value) = lookup.last_known(&link.source_id) {
                link.source_type = Some(composite(base_type, value));
            }
        }
        if link.target_type.as_deref() == Some(base_type) {
            if let Some(value) = lookup.last_known(&link.target_id) {
                link.target_type = Some(composite(base_type, value));
            }
        }
    }

    Ok(out)
}

/// Roll drilled-down labels back up: any `(base_type,*)` becomes
/// `base_type` again, whichever mode produced it. Idempotent — labels
/// that never match are left alone.
///
/// `_attribute` is kept for symmetry with [`drill_down`]; the composite
/// pattern alone identifies the rows.
pub fn roll_up(log: &FlatLog, base_type: &str, _attribute: &str) -> Result<FlatLog> {
    if log.objects.is_empty() {
        return Err(PermafrostError::EmptyModel(
            "object relation is empty; roll-up requires objects".to_string(),
        ));
    }

    let mut out = log.clone();
    for object in &mut out.objects {
        if is_composite_of(&object.object_type, base_type) {
            object.object_type = base_type.to_string();
        }
    }
    for link in &mut out.e2o {
        if link.object_type.as_deref().is_some_and(|t| is_composite_of(t, base_type)) {
            link.object_type = Some(base_type.to_string());
        }
    }
    for change in &mut out.changes {
        if is_composite_of(&change.object_type, base_type) {
            change.object_type = base_type.to_string();
        }
    }
    for link in &mut out.o2o {
        if link.source_type.as_deref().is_some_and(|t| is_composite_of(t, base_type)) {
            link.source_type = Some(base_type.to_string());
        }
        if link.target_type.as_deref().is_some_and(|t| is_composite_of(t, base_type)) {
            link.target_type = Some(base_type.to_string());
        }
    }
    Ok(out)
}

/// Relabel every event of `event_type` that links to at least one object
/// of `object_type` — through a qualifier in `qualifiers`, or through any
/// qualifier when `None` — to the composite `(event_type,object_type)`,
/// in the event table and in every link row of the affected events.
pub fn unfold(
    log: &FlatLog,
    event_type: &str,
    object_type: &str,
    qualifiers: Option<&BTreeSet<String>>,
) -> FlatLog {
    let event_types: BTreeMap<&str, &str> = log
        .events
        .iter()
        .map(|e| (e.event_id.as_str(), e.event_type.as_str()))
        .collect();
    let object_types: BTreeMap<&str, &str> = log
        .objects
        .iter()
        .map(|o| (o.object_id.as_str(), o.object_type.as_str()))
        .collect();

    let mut affected: BTreeSet<&str> = BTreeSet::new();
    for link in &log.e2o {
        let etype = link
            .event_type
            .as_deref()
            .or_else(|| event_types.get(link.event_id.as_str()).copied());
        if etype != Some(event_type) {
            continue;
        }
        let otype = link
            .object_type
            .as_deref()
            .or_else(|| object_types.get(link.object_id.as_str()).copied());
        if otype != Some(object_type) {
            continue;
        }
        let qualifier_matches = match qualifiers {
            None => true,
            Some(set) => link.qualifier.as_deref().is_some_and(|q| set.contains(q)),
        };
        if qualifier_matches {
            affected.insert(link.event_id.as_str());
        }
    }
    debug!("unfold ({event_type},{object_type}): {} affected events", affected.len());

    let label = format!("({event_type},{object_type})");
    let mut out = log.clone();
    for event in &mut out.events {
        if affected.contains(event.event_id.as_str()) {
            event.event_type = label.clone();
        }
    }
    for link in &mut out.e2o {
        if affected.contains(link.event_id.as_str()) && link.event_type.is_some() {
            link.event_type = Some(label.clone());
        }
    }
    out
}

/// Exact inverse of [`unfold`]: relabel `(event_type,object_type)` back
/// to `event_type`.
pub fn fold(log: &FlatLog, event_type: &str, object_type: &str) -> FlatLog {
    let label = format!("({event_type},{object_type})");
    let mut out = log.clone();
    for event in &mut out.events {
        if event.event_type == label {
            event.event_type = event_type.to_string();
        }
    }
    for link in &mut out.e2o {
        if link.event_type.as_deref() == Some(label.as_str()) {
            link.event_type = Some(event_type.to_string());
        }
    }
    out
}
