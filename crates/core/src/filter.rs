//! Filtering a flat log by object types and event-type frequency.

use crate::model::FlatLog;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Restrict a flat log to the given object types, then drop event types
/// whose surviving event count falls below `event_threshold`.
///
/// `object_types = None` keeps every type. Objects that end up linked to
/// no surviving event are dropped along with their changes and o2o links.
/// Pure: the input log is left untouched.
pub fn filter_by_object_types(
    log: &FlatLog,
    object_types: Option<&[String]>,
    event_threshold: usize,
) -> FlatLog {
    let kept_types: BTreeSet<&str> = match object_types {
        Some(types) => types.iter().map(String::as_str).collect(),
        None => log.objects.iter().map(|o| o.object_type.as_str()).collect(),
    };
    let type_of: BTreeMap<&str, &str> = log
        .objects
        .iter()
        .map(|o| (o.object_id.as_str(), o.object_type.as_str()))
        .collect();

    // Links to objects of a kept type.
    let candidate_links: Vec<_> = log
        .e2o
        .iter()
        .filter(|link| {
            link.object_type
                .as_deref()
                .or_else(|| type_of.get(link.object_id.as_str()).copied())
                .is_some_and(|t| kept_types.contains(t))
        })
        .collect();
    let linked_events: BTreeSet<&str> =
        candidate_links.iter().map(|l| l.event_id.as_str()).collect();

    // Events still linked, minus infrequent event types.
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in &log.events {
        if linked_events.contains(event.event_id.as_str()) {
            *counts.entry(event.event_type.as_str()).or_default() += 1;
        }
    }
    let kept_events: BTreeSet<&str> = log
        .events
        .iter()
        .filter(|e| {
            linked_events.contains(e.event_id.as_str())
                && counts.get(e.event_type.as_str()).copied().unwrap_or(0) >= event_threshold
        })
        .map(|e| e.event_id.as_str())
        .collect();

    let e2o: Vec<_> = candidate_links
        .into_iter()
        .filter(|l| kept_events.contains(l.event_id.as_str()))
        .cloned()
        .collect();
    // Owned ids: the set outlives the move of `e2o` into the result below.
    let kept_objects: BTreeSet<String> = e2o.iter().map(|l| l.object_id.clone()).collect();

    debug!(
        "filter: {} of {} events, {} of {} objects survive",
        kept_events.len(),
        log.events.len(),
        kept_objects.len(),
        log.objects.len()
    );

    FlatLog {
        events: log
            .events
            .iter()
            .filter(|e| kept_events.contains(e.event_id.as_str()))
            .cloned()
            .collect(),
        objects: log
            .objects
            .iter()
            .filter(|o| kept_objects.contains(o.object_id.as_str()))
            .cloned()
            .collect(),
        e2o,
        o2o: log
            .o2o
            .iter()
            .filter(|l| {
                kept_objects.contains(l.source_id.as_str())
                    && kept_objects.contains(l.target_id.as_str())
            })
            .cloned()
            .collect(),
        changes: log
            .changes
            .iter()
            .filter(|c| kept_objects.contains(c.object_id.as_str()))
            .cloned()
            .collect(),
    }
}
