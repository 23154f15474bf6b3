//! The data model: four authored relations plus the derived change log.
//!
//! A [`TemporalLog`] holds the versioned model (events, object snapshots
//! with validity intervals, event-to-object and object-to-object links).
//! A [`FlatLog`] is the output of freezing: the same relation shapes, but
//! objects collapse to one record per id with no validity interval, and
//! the full attribute-change audit trail is retained alongside.
//!
//! Records are never mutated by the engine — every transformation takes a
//! reference and returns newly allocated relations.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute map of a single record. Missing = absent from the map.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// The value stored in an attribute position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    /// A text string.
    Text(String),
    /// A numeric value.
    Number(f64),
    /// A boolean.
    Boolean(bool),
    /// An instant (UTC).
    Time(DateTime<Utc>),
}

// Hand-rolled so that NaN compares equal to itself: change-log derivation
// deduplicates by value equality, and a NaN attribute must not register as
// changed on every snapshot.
impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a == b,
            (AttributeValue::Number(a), AttributeValue::Number(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => a == b,
            (AttributeValue::Time(a), AttributeValue::Time(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}
impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}
impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}
impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Number(n as f64)
    }
}
impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}
impl From<DateTime<Utc>> for AttributeValue {
    fn from(t: DateTime<Utc>) -> Self {
        AttributeValue::Time(t)
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{s}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Time(t) => {
                write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

/// An event: immutable once created, stamped with a point timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Event {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            timestamp,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// One temporal snapshot of an object, valid in `[valid_from, valid_to]`.
///
/// All snapshots sharing an `object_id` together form that object's full
/// history: non-overlapping in time, ordered by `valid_from`. For a fixed
/// object, `valid_from` strictly increases across snapshots and `valid_to`
/// of one snapshot, if present, does not exceed the next `valid_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub object_id: String,
    pub object_type: String,
    /// When this snapshot became valid (validity interval start).
    pub valid_from: DateTime<Utc>,
    /// When this snapshot stopped being valid. `None` = still valid.
    pub valid_to: Option<DateTime<Utc>>,
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ObjectSnapshot {
    pub fn new(
        object_id: impl Into<String>,
        object_type: impl Into<String>,
        valid_from: DateTime<Utc>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_type: object_type.into(),
            valid_from,
            valid_to: None,
            snapshot_id: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_snapshot_id(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }

    /// Was this snapshot valid at the given instant (validity interval)?
    pub fn was_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.is_none_or(|t| t > at)
    }
}

/// Event-to-object link (many-to-many). `event_type` and `timestamp`
/// denormalize the referenced event where the producer supplied them;
/// `object_type` likewise for the referenced object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventObjectLink {
    pub event_id: String,
    pub event_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub object_id: String,
    pub object_type: Option<String>,
    /// Role label on the link (e.g. "payer", "shipped-to").
    pub qualifier: Option<String>,
    pub snapshot_id: Option<String>,
}

impl EventObjectLink {
    pub fn new(event_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: None,
            timestamp: None,
            object_id: object_id.into(),
            object_type: None,
            qualifier: None,
            snapshot_id: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// Object-to-object link. May itself be temporally versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectObjectLink {
    pub source_id: String,
    pub source_type: Option<String>,
    pub target_id: String,
    pub target_type: Option<String>,
    pub qualifier: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub source_snapshot_id: Option<String>,
    pub target_snapshot_id: Option<String>,
}

impl ObjectObjectLink {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_type: None,
            target_id: target_id.into(),
            target_type: None,
            qualifier: None,
            valid_from: None,
            valid_to: None,
            source_snapshot_id: None,
            target_snapshot_id: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// One observed attribute change, derived from the snapshot history.
///
/// Never authored by the producer. There are never two records for the
/// same `(object_id, field, timestamp)` unless the values differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub object_id: String,
    pub object_type: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the attribute that changed.
    pub field: String,
    pub value: AttributeValue,
}

/// The versioned model: the four authored relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalLog {
    pub events: Vec<Event>,
    pub objects: Vec<ObjectSnapshot>,
    pub e2o: Vec<EventObjectLink>,
    pub o2o: Vec<ObjectObjectLink>,
}

impl TemporalLog {
    /// Object ids whose history contains more than one distinct type.
    ///
    /// Type labels are compared after trimming surrounding whitespace.
    pub fn dynamic_objects(&self) -> BTreeSet<String> {
        let mut types_per_object: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for snap in &self.objects {
            types_per_object
                .entry(snap.object_id.as_str())
                .or_default()
                .insert(snap.object_type.trim());
        }
        types_per_object
            .into_iter()
            .filter(|(_, types)| types.len() > 1)
            .map(|(oid, _)| oid.to_string())
            .collect()
    }

    /// Snapshot history per object, stably sorted by `valid_from`
    /// (ties keep input order).
    pub fn snapshots_by_object(&self) -> BTreeMap<&str, Vec<&ObjectSnapshot>> {
        let mut by_object: BTreeMap<&str, Vec<&ObjectSnapshot>> = BTreeMap::new();
        for snap in &self.objects {
            by_object.entry(snap.object_id.as_str()).or_default().push(snap);
        }
        for history in by_object.values_mut() {
            history.sort_by_key(|s| s.valid_from);
        }
        by_object
    }
}

/// One object in a flat (frozen) log: no validity interval, one record
/// per `object_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatObject {
    pub object_id: String,
    pub object_type: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl FlatObject {
    pub fn new(object_id: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            object_type: object_type.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// The flat model produced by freezing. `changes` is the full audit
/// trail of the collapsed history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatLog {
    pub events: Vec<Event>,
    pub objects: Vec<FlatObject>,
    pub e2o: Vec<EventObjectLink>,
    pub o2o: Vec<ObjectObjectLink>,
    pub changes: Vec<AttributeChange>,
}

impl FlatLog {
    pub fn object(&self, object_id: &str) -> Option<&FlatObject> {
        self.objects.iter().find(|o| o.object_id == object_id)
    }

    /// The stored attribute value of an object, if any.
    pub fn object_attribute(&self, object_id: &str, attribute: &str) -> Option<&AttributeValue> {
        self.object(object_id)?.attributes.get(attribute)
    }
}
