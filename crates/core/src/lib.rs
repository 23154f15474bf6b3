//! Permafrost — temporal object-centric event log engine.
//!
//! The core primitive is a [`TemporalLog`]: an event log whose objects are
//! *temporally versioned* — each object is a sequence of snapshots, every
//! snapshot stamped with a validity interval (`valid_from` / `valid_to`).
//! Over time an object's attributes, and even its type, may change.
//!
//! Permafrost collapses such a log into a flat, point-in-time consistent
//! [`FlatLog`] ("freezing"), and rewrites object/event types along
//! attribute-based hierarchies (drill-down / roll-up, unfold / fold),
//! optionally using the full change history rather than only the latest
//! known value.
//!
//! # Quick start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use permafrost::{freeze, FreezeMode, FreezeOptions, ObjectSnapshot, TemporalLog};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
//!
//! // An order that turns into a backorder two months later.
//! let log = TemporalLog {
//!     objects: vec![
//!         ObjectSnapshot::new("o1", "Order", t0).with_attr("priority", "low"),
//!         ObjectSnapshot::new("o1", "Backorder", t2).with_attr("priority", "high"),
//!     ],
//!     ..Default::default()
//! };
//!
//! // Global freezing: the type change survives as a synthetic supertype
//! // plus an attribute-history trail.
//! let flat = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap();
//! assert_eq!(flat.objects[0].object_type, "dynamic");
//!
//! // Snapshot freezing: the whole log agrees on the type valid at t.
//! let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
//! let flat_at = freeze(&log, FreezeMode::At(t1), &FreezeOptions::default()).unwrap();
//! assert_eq!(flat_at.objects[0].object_type, "Order");
//! ```

pub mod changes;
pub mod filter;
pub mod freeze;
pub mod model;
pub mod olap;
pub mod resolve;
pub mod schema;

pub use changes::derive_changes;
pub use filter::filter_by_object_types;
pub use freeze::{freeze, FreezeMode, FreezeOptions};
pub use model::{
    AttributeChange, AttributeValue, Attributes, Event, EventObjectLink, FlatLog, FlatObject,
    ObjectObjectLink, ObjectSnapshot, TemporalLog,
};
pub use olap::{drill_down, fold, roll_up, unfold};
pub use resolve::AsOfIndex;
pub use schema::{parse_instant, Record};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PermafrostError {
    /// A required column could not be identified on an input relation.
    #[error("schema error: {0}")]
    Schema(String),
    /// The object relation is missing or empty where a transformation
    /// requires it.
    #[error("empty model: {0}")]
    EmptyModel(String),
    /// A timestamp literal could not be parsed. Carries the literal.
    #[error("unparseable timestamp: {0:?}")]
    TimeParse(String),
}

pub type Result<T> = std::result::Result<T, PermafrostError>;
