//! As-of resolution over per-object value histories.
//!
//! An [`AsOfIndex`] answers "what value was effective for this object at
//! time `t`?" against a stream of `(object_id, valid_from, value)` records.
//! The rule: pick the record with the greatest `valid_from <= t`; if the
//! object's earliest record is still in the future, fall back to that
//! earliest record. Every object known to the index resolves to *some*
//! value — objects are never silently dropped.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-object ordered value history with as-of lookup.
///
/// Histories are kept stably sorted by `valid_from`: records sharing the
/// same `valid_from` for the same object keep their input order, and the
/// *later* one wins an as-of lookup. This tie-break is part of the
/// contract, not an accident.
#[derive(Debug, Clone)]
pub struct AsOfIndex<V> {
    histories: BTreeMap<String, Vec<(DateTime<Utc>, V)>>,
}

impl<V> Default for AsOfIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AsOfIndex<V> {
    pub fn new() -> Self {
        Self {
            histories: BTreeMap::new(),
        }
    }

    /// Build an index from a change stream, in input order.
    pub fn from_stream<I>(stream: I) -> Self
    where
        I: IntoIterator<Item = (String, DateTime<Utc>, V)>,
    {
        let mut index = Self::new();
        for (object_id, valid_from, value) in stream {
            index.push(object_id, valid_from, value);
        }
        for history in index.histories.values_mut() {
            // Stable: equal valid_from keeps input order.
            history.sort_by_key(|(valid_from, _)| *valid_from);
        }
        index
    }

    fn push(&mut self, object_id: String, valid_from: DateTime<Utc>, value: V) {
        self.histories
            .entry(object_id)
            .or_default()
            .push((valid_from, value));
    }

    /// The value effective for `object_id` at instant `at`.
    ///
    /// Returns `None` only for objects absent from the index; the caller
    /// supplies a base value for those (typically the object's own
    /// currently-stored attribute).
    pub fn value_at(&self, object_id: &str, at: DateTime<Utc>) -> Option<&V> {
        let history = self.histories.get(object_id)?;
        history
            .iter()
            .rev()
            .find(|(valid_from, _)| *valid_from <= at)
            .or_else(|| history.first())
            .map(|(_, value)| value)
    }

    /// The last recorded value for `object_id`.
    pub fn last_value(&self, object_id: &str) -> Option<&V> {
        self.histories
            .get(object_id)
            .and_then(|history| history.last())
            .map(|(_, value)| value)
    }

    /// Every object id present in the index, ascending.
    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(String::as_str)
    }

    pub fn contains(&self, object_id: &str) -> bool {
        self.histories.contains_key(object_id)
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// One resolved value per distinct object id, ascending by id.
    pub fn resolve_all(&self, at: DateTime<Utc>) -> Vec<(&str, &V)> {
        self.histories
            .keys()
            .filter_map(|oid| self.value_at(oid, at).map(|v| (oid.as_str(), v)))
            .collect()
    }
}
