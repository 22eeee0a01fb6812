// crates/router-core/tests/fan_out.rs

use std::time::Duration;

use router_core::{
    Channel, ChannelId, ChannelTime, ChannelType, ConnectionId, FanOutDelivery, FieldValue,
    Record, SubscriptionOptionsPatch,
};

const C0: ConnectionId = ConnectionId(1);
const C1: ConnectionId = ConnectionId(2);
const C2: ConnectionId = ConnectionId(3);

fn test_channel() -> Channel {
    let mut ch = Channel::new(
        ChannelId(1),
        ChannelType::Test,
        String::new(),
        Some(C0),
        Duration::from_millis(20),
    );
    ch.init_data(
        Record::new()
            .with("text", FieldValue::str("a"))
            .with("num", FieldValue::Int(1)),
    );
    ch
}

fn deliveries_for(deliveries: &[FanOutDelivery], conn: ConnectionId) -> Vec<&Record> {
    deliveries
        .iter()
        .filter(|d| d.conn_id == conn)
        .map(|d| &d.update)
        .collect()
}

/// Two subscribers at 50ms / 100ms cadences over a channel updated at
/// 160ms and 220ms, ticked at 100/150/200/250ms.
#[test]
fn fan_out_cadences() {
    let mut ch = test_channel();
    let mut c1_queue: Vec<Record> = Vec::new();
    let mut c2_queue: Vec<Record> = Vec::new();

    ch.subscribe(C0, &SubscriptionOptionsPatch::default());
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(50));

    let mut collect = |ch: &mut Channel, now: ChannelTime| {
        for d in ch.tick_data(now) {
            if d.conn_id == C1 {
                c1_queue.push(d.update);
            } else if d.conn_id == C2 {
                c2_queue.push(d.update);
            }
        }
        (c1_queue.clone(), c2_queue.clone())
    };

    let start = ChannelTime::from_millis(100);

    // First tick: c1 owes its snapshot.
    let (q1, q2) = collect(&mut ch, start);
    assert_eq!((q1.len(), q2.len()), (1, 0));
    assert_eq!(q1.last().unwrap().get("num"), Some(&FieldValue::Int(1)));
    assert_eq!(q1.last().unwrap().get("text").unwrap().as_str(), Some("a"));

    // c2 joins; its snapshot arrives on the next tick. c1 sees nothing new.
    ch.subscribe(C2, &SubscriptionOptionsPatch::fan_out_ms(100));
    let (q1, q2) = collect(&mut ch, start.add_ms(50));
    assert_eq!((q1.len(), q2.len()), (1, 1));
    assert_eq!(q2.last().unwrap().get("num"), Some(&FieldValue::Int(1)));
    assert_eq!(q2.last().unwrap().get("text").unwrap().as_str(), Some("a"));

    // U1 arrives at 160ms.
    ch.ensure_data()
        .on_update(Record::new().with("text", FieldValue::str("b")), start.add_ms(60));

    // Tick at 200ms: c1 gets U1; c2's window has not elapsed.
    let (q1, q2) = collect(&mut ch, start.add_ms(100));
    assert_eq!((q1.len(), q2.len()), (2, 1));
    let last = q1.last().unwrap();
    assert_eq!(last.get("text").unwrap().as_str(), Some("b"));
    assert_eq!(last.get("num"), None, "delta must not carry unchanged fields");

    // U2 arrives at 220ms.
    ch.ensure_data()
        .on_update(Record::new().with("text", FieldValue::str("c")), start.add_ms(120));

    // Tick at 250ms: c1 gets U2 alone; c2 gets U1+U2 coalesced.
    let (q1, q2) = collect(&mut ch, start.add_ms(150));
    assert_eq!((q1.len(), q2.len()), (3, 2));
    assert_eq!(q1.last().unwrap().get("text").unwrap().as_str(), Some("c"));
    assert_eq!(q2.last().unwrap().get("text").unwrap().as_str(), Some("c"));
}

/// The delivery cursor never moves backwards, and only moves on delivery.
#[test]
fn cursor_is_non_decreasing() {
    let mut ch = test_channel();
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(50));

    let mut cursors = Vec::new();
    for tick_ms in [0i64, 50, 100, 150, 200] {
        let now = ChannelTime::from_millis(tick_ms);
        if tick_ms == 100 {
            ch.ensure_data()
                .on_update(Record::new().with("num", FieldValue::Int(2)), now);
        }
        ch.tick_data(now);
        if let Some(t) = ch.subscription(C1).unwrap().last_fan_out_time {
            cursors.push(t);
        }
    }
    assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    // Empty-window ticks at 150/200 left the cursor parked at the last
    // delivery (100ms).
    assert_eq!(*cursors.last().unwrap(), ChannelTime::from_millis(100));
}

/// Coalescing buffered updates and applying them one by one produce the
/// same record, before and after mask filtering.
#[test]
fn coalesced_delta_equals_sequential_application() {
    let mut ch = test_channel();
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(10));
    ch.tick_data(ChannelTime::ZERO); // snapshot; cursor at 0

    let updates = [
        Record::new().with("text", FieldValue::str("x")),
        Record::new().with("num", FieldValue::Int(7)),
        Record::new().with("text", FieldValue::str("y")),
    ];
    let mut sequential = ch.data().unwrap().msg().clone();
    for (i, u) in updates.iter().enumerate() {
        ch.ensure_data()
            .on_update(u.clone(), ChannelTime::from_millis(10 * (i as i64 + 1)));
        router_core::merge_with_options(&mut sequential, u, &Default::default());
    }

    let deliveries = ch.tick_data(ChannelTime::from_millis(100));
    assert_eq!(deliveries.len(), 1);
    let delta = &deliveries[0].update;

    // Folding the delta into the pre-update snapshot reproduces the
    // sequentially-updated record.
    let mut folded = test_channel().data().unwrap().msg().clone();
    router_core::merge_with_options(&mut folded, delta, &Default::default());
    assert_eq!(folded, sequential);
}

/// A new subscriber gets the current snapshot and never sees updates from
/// before it joined as explicit deltas.
#[test]
fn late_subscriber_gets_snapshot_not_history() {
    let mut ch = test_channel();
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(10));
    ch.tick_data(ChannelTime::ZERO);

    ch.ensure_data()
        .on_update(Record::new().with("text", FieldValue::str("early")), ChannelTime::from_millis(5));
    ch.tick_data(ChannelTime::from_millis(20));

    ch.subscribe(C2, &SubscriptionOptionsPatch::fan_out_ms(10));
    let deliveries = ch.tick_data(ChannelTime::from_millis(40));
    let for_c2 = deliveries_for(&deliveries, C2);
    assert_eq!(for_c2.len(), 1);
    // Snapshot carries the full current record, not a delta.
    assert_eq!(for_c2[0].get("text").unwrap().as_str(), Some("early"));
    assert_eq!(for_c2[0].get("num"), Some(&FieldValue::Int(1)));
}

/// The update buffer shrinks once every subscriber has moved past an entry.
#[test]
fn buffer_pruned_to_oldest_cursor() {
    let mut ch = test_channel();
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(10));
    ch.subscribe(C2, &SubscriptionOptionsPatch::fan_out_ms(1000));
    ch.tick_data(ChannelTime::ZERO);

    for i in 1..=5i64 {
        ch.ensure_data().on_update(
            Record::new().with("num", FieldValue::Int(i)),
            ChannelTime::from_millis(i * 10),
        );
    }
    // c1 drains; c2's cadence keeps its cursor at 0, pinning the buffer.
    ch.tick_data(ChannelTime::from_millis(60));
    assert_eq!(ch.data().unwrap().buffered(), 5);

    // Once c2 delivers, everything up to its new cursor is dropped.
    ch.tick_data(ChannelTime::from_millis(1000));
    assert_eq!(ch.data().unwrap().buffered(), 0);
}

/// Re-subscribing updates options without resetting the cursor.
#[test]
fn resubscribe_keeps_cursor() {
    let mut ch = test_channel();
    ch.subscribe(C1, &SubscriptionOptionsPatch::fan_out_ms(50));
    ch.tick_data(ChannelTime::from_millis(100));
    let cursor = ch.subscription(C1).unwrap().last_fan_out_time;
    assert!(cursor.is_some());

    let newly_added = ch.subscribe(
        C1,
        &SubscriptionOptionsPatch {
            can_update_data: Some(true),
            ..Default::default()
        },
    );
    assert!(!newly_added);
    let sub = ch.subscription(C1).unwrap();
    assert_eq!(sub.last_fan_out_time, cursor);
    assert!(sub.options.can_update_data);
    // Unpatched fields kept their values.
    assert_eq!(sub.options.fan_out_interval, Duration::from_millis(50));
}
