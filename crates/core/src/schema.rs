//! Column-name-tolerant ingestion of raw tabular records.
//!
//! The engine consumes its four relations through an adapter that
//! recognizes multiple historical aliases for the same semantic column
//! (`ocel:oid` / `object_id` / `oid`, and so on). Aliases are resolved
//! once per relation, in declared order, before any row is read; if no
//! alias of a required column matches, the adapter fails with a
//! [`PermafrostError::Schema`] rather than guessing.
//!
//! Timestamps are normalized to UTC instants on the way in: literals with
//! an explicit offset have the offset applied and dropped, naive literals
//! are assumed already normalized.

use crate::model::{
    AttributeChange, AttributeValue, Attributes, Event, EventObjectLink, FlatLog, FlatObject,
    ObjectObjectLink, ObjectSnapshot, TemporalLog,
};
use crate::{PermafrostError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use log::debug;

/// One raw row: column name to value. Missing = absent from the map.
pub type Record = std::collections::BTreeMap<String, AttributeValue>;

/// Recognized aliases per semantic column, in resolution order.
pub mod aliases {
    pub const EVENT_ID: &[&str] = &["ocel:eid", "event_id", "eid"];
    pub const EVENT_TYPE: &[&str] = &["ocel:activity", "event_type", "activity"];
    pub const TIMESTAMP: &[&str] = &["ocel:timestamp", "timestamp", "time"];
    pub const OBJECT_ID: &[&str] = &["ocel:oid", "object_id", "oid"];
    pub const OBJECT_TYPE: &[&str] = &["ocel:type", "object_type", "type"];
    pub const VALID_FROM: &[&str] =
        &["ocel:timestamp:valid_from", "valid_from", "timestamp_valid_from"];
    pub const VALID_TO: &[&str] = &["ocel:timestamp:valid_to", "valid_to", "timestamp_valid_to"];
    pub const SNAPSHOT_ID: &[&str] = &["ocel:osid", "snapshot_id", "osid"];
    pub const QUALIFIER: &[&str] = &["ocel:qualifier", "qualifier", "qual"];
    pub const TARGET_OBJECT_ID: &[&str] = &["ocel:oid_2", "target_object_id", "oid_2"];
    pub const TARGET_OBJECT_TYPE: &[&str] = &["ocel:type_2", "target_object_type", "type_2"];
    pub const TARGET_SNAPSHOT_ID: &[&str] = &["ocel:osid_2", "target_snapshot_id", "osid_2"];
    pub const FIELD: &[&str] = &["ocel:field", "field", "attribute", "changed_attribute"];
    pub const VALUE: &[&str] = &["ocel:value", "value", "val"];
}

/// Parse a timestamp literal to a timezone-normalized UTC instant.
///
/// Accepts RFC 3339 (offset applied then dropped) and naive
/// date / datetime literals, which are assumed already normalized.
pub fn parse_instant(literal: &str) -> Result<DateTime<Utc>> {
    let trimmed = literal.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(PermafrostError::TimeParse(literal.to_string()))
}

// First alias that appears in any row of the relation.
fn find_column<'a>(rows: &[Record], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|alias| rows.iter().any(|row| row.contains_key(*alias)))
}

fn require_column<'a>(
    rows: &[Record],
    candidates: &[&'a str],
    relation: &str,
    semantic: &str,
) -> Result<&'a str> {
    find_column(rows, candidates).ok_or_else(|| {
        PermafrostError::Schema(format!(
            "unable to identify {semantic} column on {relation} (tried {candidates:?})"
        ))
    })
}

fn text(row: &Record, column: &str) -> Option<String> {
    row.get(column).map(|value| value.to_string())
}

fn opt_text(row: &Record, column: Option<&str>) -> Option<String> {
    column.and_then(|c| text(row, c))
}

fn time(row: &Record, column: &str) -> Result<Option<DateTime<Utc>>> {
    match row.get(column) {
        None => Ok(None),
        Some(AttributeValue::Time(t)) => Ok(Some(*t)),
        Some(AttributeValue::Text(s)) => parse_instant(s).map(Some),
        Some(other) => Err(PermafrostError::TimeParse(other.to_string())),
    }
}

fn opt_time(row: &Record, column: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match column {
        Some(c) => time(row, c),
        None => Ok(None),
    }
}

// Everything not claimed by a resolved column is an attribute.
fn remaining_attributes(row: &Record, claimed: &[Option<&str>]) -> Attributes {
    row.iter()
        .filter(|(name, _)| !claimed.iter().any(|c| *c == Some(name.as_str())))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn events_from_records(rows: &[Record]) -> Result<Vec<Event>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let id_col = require_column(rows, aliases::EVENT_ID, "events", "event id")?;
    let type_col = require_column(rows, aliases::EVENT_TYPE, "events", "event type")?;
    let ts_col = require_column(rows, aliases::TIMESTAMP, "events", "timestamp")?;
    let claimed = [Some(id_col), Some(type_col), Some(ts_col)];

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(event_id), Some(event_type)) = (text(row, id_col), text(row, type_col)) else {
            debug!("skipping event row without id or type");
            continue;
        };
        let Some(timestamp) = time(row, ts_col)? else {
            debug!("skipping event {event_id} without timestamp");
            continue;
        };
        events.push(Event {
            event_id,
            event_type,
            timestamp,
            attributes: remaining_attributes(row, &claimed),
        });
    }
    Ok(events)
}

fn objects_from_records(rows: &[Record]) -> Result<Vec<ObjectSnapshot>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let id_col = require_column(rows, aliases::OBJECT_ID, "objects", "object id")?;
    let type_col = require_column(rows, aliases::OBJECT_TYPE, "objects", "object type")?;
    let from_col = require_column(rows, aliases::VALID_FROM, "objects", "interval start")?;
    let to_col = find_column(rows, aliases::VALID_TO);
    let snap_col = find_column(rows, aliases::SNAPSHOT_ID);
    let claimed = [Some(id_col), Some(type_col), Some(from_col), to_col, snap_col];

    let mut snapshots = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(object_id), Some(object_type)) = (text(row, id_col), text(row, type_col)) else {
            debug!("skipping object snapshot without id or type");
            continue;
        };
        let Some(valid_from) = time(row, from_col)? else {
            debug!("skipping snapshot of {object_id} without interval start");
            continue;
        };
        snapshots.push(ObjectSnapshot {
            object_id,
            object_type,
            valid_from,
            valid_to: opt_time(row, to_col)?,
            snapshot_id: opt_text(row, snap_col),
            attributes: remaining_attributes(row, &claimed),
        });
    }
    Ok(snapshots)
}

fn e2o_from_records(rows: &[Record]) -> Result<Vec<EventObjectLink>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let eid_col = require_column(rows, aliases::EVENT_ID, "e2o", "event id")?;
    let oid_col = require_column(rows, aliases::OBJECT_ID, "e2o", "object id")?;
    let etype_col = find_column(rows, aliases::EVENT_TYPE);
    let ts_col = find_column(rows, aliases::TIMESTAMP);
    let otype_col = find_column(rows, aliases::OBJECT_TYPE);
    let qual_col = find_column(rows, aliases::QUALIFIER);
    let snap_col = find_column(rows, aliases::SNAPSHOT_ID);

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(event_id), Some(object_id)) = (text(row, eid_col), text(row, oid_col)) else {
            debug!("skipping e2o row without event id or object id");
            continue;
        };
        links.push(EventObjectLink {
            event_id,
            event_type: opt_text(row, etype_col),
            timestamp: opt_time(row, ts_col)?,
            object_id,
            object_type: opt_text(row, otype_col),
            qualifier: opt_text(row, qual_col),
            snapshot_id: opt_text(row, snap_col),
        });
    }
    Ok(links)
}

fn o2o_from_records(rows: &[Record]) -> Result<Vec<ObjectObjectLink>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let src_col = require_column(rows, aliases::OBJECT_ID, "o2o", "source object id")?;
    let tgt_col = require_column(rows, aliases::TARGET_OBJECT_ID, "o2o", "target object id")?;
    let src_type_col = find_column(rows, aliases::OBJECT_TYPE);
    let tgt_type_col = find_column(rows, aliases::TARGET_OBJECT_TYPE);
    let qual_col = find_column(rows, aliases::QUALIFIER);
    let from_col = find_column(rows, aliases::VALID_FROM);
    let to_col = find_column(rows, aliases::VALID_TO);
    let src_snap_col = find_column(rows, aliases::SNAPSHOT_ID);
    let tgt_snap_col = find_column(rows, aliases::TARGET_SNAPSHOT_ID);

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(source_id), Some(target_id)) = (text(row, src_col), text(row, tgt_col)) else {
            debug!("skipping o2o row without source or target id");
            continue;
        };
        links.push(ObjectObjectLink {
            source_id,
            source_type: opt_text(row, src_type_col),
            target_id,
            target_type: opt_text(row, tgt_type_col),
            qualifier: opt_text(row, qual_col),
            valid_from: opt_time(row, from_col)?,
            valid_to: opt_time(row, to_col)?,
            source_snapshot_id: opt_text(row, src_snap_col),
            target_snapshot_id: opt_text(row, tgt_snap_col),
        });
    }
    Ok(links)
}

fn flat_objects_from_records(rows: &[Record]) -> Result<Vec<FlatObject>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let id_col = require_column(rows, aliases::OBJECT_ID, "objects", "object id")?;
    let type_col = require_column(rows, aliases::OBJECT_TYPE, "objects", "object type")?;
    let claimed = [Some(id_col), Some(type_col)];

    let mut objects = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(object_id), Some(object_type)) = (text(row, id_col), text(row, type_col)) else {
            debug!("skipping object row without id or type");
            continue;
        };
        objects.push(FlatObject {
            object_id,
            object_type,
            attributes: remaining_attributes(row, &claimed),
        });
    }
    Ok(objects)
}

/// Changes come in two historical layouts: *long* (a dedicated value
/// column next to the field-name column) and *wide* (the value lives in
/// the column named by the field).
fn changes_from_records(rows: &[Record]) -> Result<Vec<AttributeChange>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let oid_col = require_column(rows, aliases::OBJECT_ID, "changes", "object id")?;
    let otype_col = require_column(rows, aliases::OBJECT_TYPE, "changes", "object type")?;
    let ts_col = require_column(rows, aliases::TIMESTAMP, "changes", "timestamp")?;
    let field_col = require_column(rows, aliases::FIELD, "changes", "changed attribute name")?;
    let value_col = find_column(rows, aliases::VALUE);

    let mut changes = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(object_id), Some(object_type), Some(field)) =
            (text(row, oid_col), text(row, otype_col), text(row, field_col))
        else {
            debug!("skipping change row without id, type or field");
            continue;
        };
        let Some(timestamp) = time(row, ts_col)? else {
            debug!("skipping change of {object_id}/{field} without timestamp");
            continue;
        };
        let value = match value_col {
            Some(c) => row.get(c).cloned(),
            None => row.get(field.as_str()).cloned(),
        };
        let Some(value) = value else {
            debug!("skipping change of {object_id}/{field} without value");
            continue;
        };
        changes.push(AttributeChange {
            object_id,
            object_type,
            timestamp,
            field,
            value,
        });
    }
    Ok(changes)
}

impl TemporalLog {
    /// Build a temporal log from raw records via the alias adapter.
    ///
    /// The object relation is required by every downstream operation but
    /// may be empty here; freezing reports [`PermafrostError::EmptyModel`]
    /// at call time.
    pub fn from_records(
        events: &[Record],
        objects: &[Record],
        e2o: &[Record],
        o2o: &[Record],
    ) -> Result<Self> {
        Ok(Self {
            events: events_from_records(events)?,
            objects: objects_from_records(objects)?,
            e2o: e2o_from_records(e2o)?,
            o2o: o2o_from_records(o2o)?,
        })
    }
}

impl FlatLog {
    /// Build an already-flat log (for OLAP callers) from raw records.
    pub fn from_records(
        events: &[Record],
        objects: &[Record],
        e2o: &[Record],
        o2o: &[Record],
        changes: &[Record],
    ) -> Result<Self> {
        Ok(Self {
            events: events_from_records(events)?,
            objects: flat_objects_from_records(objects)?,
            e2o: e2o_from_records(e2o)?,
            o2o: o2o_from_records(o2o)?,
            changes: changes_from_records(changes)?,
        })
    }
}

// ---------------------------------------------------------------------------
// JSON seam — the narrow interface persistence collaborators consume.
// ---------------------------------------------------------------------------

impl AttributeValue {
    /// Best-effort conversion from a JSON scalar. `null` and composite
    /// values map to missing.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(AttributeValue::Text(s.clone())),
            serde_json::Value::Number(n) => n.as_f64().map(AttributeValue::Number),
            serde_json::Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Text(s) => serde_json::Value::String(s.clone()),
            AttributeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Time(_) => serde_json::Value::String(self.to_string()),
        }
    }
}

/// Convert a JSON object into a raw [`Record`], dropping nulls and
/// composite values.
pub fn record_from_json(object: &serde_json::Map<String, serde_json::Value>) -> Record {
    object
        .iter()
        .filter_map(|(name, value)| {
            AttributeValue::from_json(value).map(|v| (name.clone(), v))
        })
        .collect()
}
