//! End-to-end scenarios: raw records through the adapter, freezing in
//! both modes, then OLAP rewriting on the frozen log.

use chrono::{DateTime, Utc};
use permafrost::{
    drill_down, fold, freeze, roll_up, unfold, AttributeValue, FreezeMode, FreezeOptions, Record,
    TemporalLog,
};

fn dt(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::from(*value)))
        .collect()
}

/// Two orders (one of which becomes a backorder), one item, three events.
fn order_log() -> TemporalLog {
    let events = vec![
        record(&[
            ("ocel:eid", "e1"),
            ("ocel:activity", "create"),
            ("ocel:timestamp", "2024-01-01T09:00:00Z"),
        ]),
        record(&[
            ("ocel:eid", "e2"),
            ("ocel:activity", "create"),
            ("ocel:timestamp", "2024-01-02T09:00:00Z"),
        ]),
        record(&[
            ("ocel:eid", "e3"),
            ("ocel:activity", "ship"),
            ("ocel:timestamp", "2024-03-05T09:00:00Z"),
        ]),
    ];
    let objects = vec![
        record(&[
            ("ocel:oid", "o1"),
            ("ocel:type", "Order"),
            ("ocel:timestamp:valid_from", "2024-01-01T00:00:00Z"),
            ("priority", "high"),
        ]),
        record(&[
            ("ocel:oid", "o1"),
            ("ocel:type", "Backorder"),
            ("ocel:timestamp:valid_from", "2024-03-01T00:00:00Z"),
            ("priority", "high"),
        ]),
        record(&[
            ("ocel:oid", "o2"),
            ("ocel:type", "Order"),
            ("ocel:timestamp:valid_from", "2024-01-02T00:00:00Z"),
            ("priority", "low"),
        ]),
        record(&[
            ("ocel:oid", "i1"),
            ("ocel:type", "Item"),
            ("ocel:timestamp:valid_from", "2024-01-01T00:00:00Z"),
        ]),
    ];
    let e2o = vec![
        record(&[
            ("ocel:eid", "e1"),
            ("ocel:activity", "create"),
            ("ocel:timestamp", "2024-01-01T09:00:00Z"),
            ("ocel:oid", "o1"),
            ("ocel:type", "Order"),
            ("ocel:qualifier", "created"),
        ]),
        record(&[
            ("ocel:eid", "e2"),
            ("ocel:activity", "create"),
            ("ocel:timestamp", "2024-01-02T09:00:00Z"),
            ("ocel:oid", "o2"),
            ("ocel:type", "Order"),
            ("ocel:qualifier", "created"),
        ]),
        record(&[
            ("ocel:eid", "e3"),
            ("ocel:activity", "ship"),
            ("ocel:timestamp", "2024-03-05T09:00:00Z"),
            ("ocel:oid", "o1"),
            ("ocel:type", "Backorder"),
            ("ocel:qualifier", "shipped"),
        ]),
    ];
    let o2o = vec![record(&[
        ("ocel:oid", "o1"),
        ("ocel:type", "Order"),
        ("ocel:oid_2", "i1"),
        ("ocel:type_2", "Item"),
        ("ocel:qualifier", "contains"),
    ])];

    TemporalLog::from_records(&events, &objects, &e2o, &o2o).unwrap()
}

#[test]
fn global_freeze_preserves_type_history_of_o1() {
    let log = order_log();
    let opts = FreezeOptions::default();
    let flat = freeze(&log, FreezeMode::Global, &opts).unwrap();

    // o1 changed type: synthetic supertype everywhere.
    assert_eq!(flat.object("o1").unwrap().object_type, "dynamic");
    assert_eq!(
        flat.object_attribute("o1", &opts.type_history_attribute),
        Some(&AttributeValue::from("Backorder"))
    );

    // Two type-history entries: first type at t0, new type at t2.
    let trail: Vec<_> = flat
        .changes
        .iter()
        .filter(|c| c.object_id == "o1" && c.field == opts.type_history_attribute)
        .collect();
    assert_eq!(trail.len(), 2);
    assert_eq!(
        (trail[0].timestamp, &trail[0].value),
        (dt("2024-01-01T00:00:00Z"), &AttributeValue::from("Order"))
    );
    assert_eq!(
        (trail[1].timestamp, &trail[1].value),
        (dt("2024-03-01T00:00:00Z"), &AttributeValue::from("Backorder"))
    );

    // Static objects keep their real types.
    assert_eq!(flat.object("o2").unwrap().object_type, "Order");
    assert_eq!(flat.object("i1").unwrap().object_type, "Item");
}

#[test]
fn snapshot_freeze_between_transitions_picks_the_earlier_type() {
    let log = order_log();
    let flat = freeze(
        &log,
        FreezeMode::At(dt("2024-02-01T00:00:00Z")),
        &FreezeOptions::default(),
    )
    .unwrap();

    // t0 < t1 < t2: o1 is an Order everywhere, including its change rows
    // and the e2o row stamped after the type transition.
    assert_eq!(flat.object("o1").unwrap().object_type, "Order");
    assert!(flat
        .changes
        .iter()
        .filter(|c| c.object_id == "o1")
        .all(|c| c.object_type == "Order"));
    assert!(flat
        .e2o
        .iter()
        .filter(|l| l.object_id == "o1")
        .all(|l| l.object_type.as_deref() == Some("Order")));
    assert!(!flat.objects.iter().any(|o| o.object_type == "dynamic"));
}

#[test]
fn drill_down_then_roll_up_restores_the_base_type() {
    let log = order_log();
    let flat = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap();

    let drilled = drill_down(&flat, "Order", "priority", false).unwrap();
    // o1 is dynamic after global freezing; o2 is the remaining Order.
    assert_eq!(drilled.object("o2").unwrap().object_type, "(Order,low)");

    let rolled = roll_up(&drilled, "Order", "priority").unwrap();
    assert_eq!(rolled, flat);
}

#[test]
fn history_aware_drill_down_after_snapshot_freeze() {
    let log = order_log();
    let flat = freeze(
        &log,
        FreezeMode::At(dt("2024-06-01T00:00:00Z")),
        &FreezeOptions::default(),
    )
    .unwrap();

    let drilled = drill_down(&flat, "Backorder", "priority", true).unwrap();
    assert_eq!(drilled.object("o1").unwrap().object_type, "(Backorder,high)");

    let rolled = roll_up(&drilled, "Backorder", "priority").unwrap();
    assert_eq!(rolled, flat);
}

#[test]
fn unfold_then_fold_restores_event_types() {
    let log = order_log();
    let flat = freeze(&log, FreezeMode::Global, &FreezeOptions::default()).unwrap();

    let unfolded = unfold(&flat, "create", "Order", None);
    // e2 links to o2 (still an Order); e1's o1 became dynamic.
    let e2 = unfolded.events.iter().find(|e| e.event_id == "e2").unwrap();
    assert_eq!(e2.event_type, "(create,Order)");
    let e1 = unfolded.events.iter().find(|e| e.event_id == "e1").unwrap();
    assert_eq!(e1.event_type, "create");

    let folded = fold(&unfolded, "create", "Order");
    assert_eq!(folded, flat);
}
