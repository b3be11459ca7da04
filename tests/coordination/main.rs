use std::sync::Arc;
use std::time::Duration;

use relayed_rust::{
    CoordinationRequest, CoordinationSettings, CoordinationStore, InMemoryCoordinationStore,
    ManualClock, NewWorkMessage, ServiceInstance, WorkSource, WorkStatus,
};

fn store_with_clock() -> (InMemoryCoordinationStore, ManualClock) {
    let clock = ManualClock::default();
    let store = InMemoryCoordinationStore::with_clock(Arc::new(clock.clone()));
    (store, clock)
}

fn instance(id: &str) -> ServiceInstance {
    ServiceInstance::new(id, "orders")
}

fn event(id: &str, stream: &str) -> NewWorkMessage {
    NewWorkMessage::new(id, "orders-out", "OrderPlaced", vec![1, 2], stream).as_event()
}

// --- Same-call store + append ---

#[test]
fn stored_event_returns_with_status_and_appends_version_one() {
    let (store, _) = store_with_clock();

    let batch = store
        .coordinate(&CoordinationRequest::heartbeat(instance("i-1")).store_outbox(event("m-1", "S")))
        .unwrap();

    // The same call's response includes the message, already stored.
    assert_eq!(batch.len(), 1);
    let work = &batch.items()[0];
    assert_eq!(work.message_id, "m-1");
    assert!(work.newly_stored);
    assert!(work.status.contains(WorkStatus::STORED));

    // And the event store gained exactly one (S, 1) row.
    let events = store.peek_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!((events[0].stream_id.as_str(), events[0].version), ("S", 1));
}

#[test]
fn batch_of_same_stream_events_versions_in_submission_order() {
    let (store, _) = store_with_clock();

    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1"))
                .store_outbox(event("m-1", "S"))
                .store_outbox(event("m-2", "S"))
                .store_outbox(event("m-3", "T"))
                .store_outbox(event("m-4", "S")),
        )
        .unwrap();

    let events = store.peek_events().unwrap();
    let versions: Vec<(&str, &str, u64)> = events
        .iter()
        .map(|e| (e.event_id.as_str(), e.stream_id.as_str(), e.version))
        .collect();
    assert_eq!(
        versions,
        vec![
            ("m-1", "S", 1),
            ("m-2", "S", 2),
            ("m-3", "T", 1),
            ("m-4", "S", 3),
        ]
    );
}

#[test]
fn replayed_append_at_same_version_is_noop() {
    let (store, _) = store_with_clock();
    let request = CoordinationRequest::heartbeat(instance("i-1")).store_outbox(event("m-1", "S"));

    store.coordinate(&request).unwrap();
    store.coordinate(&request).unwrap();
    store.coordinate(&request).unwrap();

    assert_eq!(store.peek_events().unwrap().len(), 1);
}

// --- Effectively-once inbound ---

#[test]
fn dedup_ledger_outlives_the_inbox_row() {
    let (store, _) = store_with_clock();
    let message = NewWorkMessage::new("in-1", "handler", "OrderPlaced", vec![1], "S");

    let batch = store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1")).receive_inbox(message.clone()),
        )
        .unwrap();
    assert_eq!(batch.len(), 1);

    // Handle it to the end: the row is deleted, the ledger entry is not.
    store
        .coordinate(&CoordinationRequest::heartbeat(instance("i-1")).complete(
            WorkSource::Inbox,
            "in-1",
            WorkStatus::EVENT_STORED,
        ))
        .unwrap();
    assert!(store.peek_items(WorkSource::Inbox).unwrap().is_empty());

    // Redelivery of the same id is silently dropped forever after.
    for _ in 0..3 {
        let batch = store
            .coordinate(
                &CoordinationRequest::heartbeat(instance("i-1")).receive_inbox(message.clone()),
            )
            .unwrap();
        assert!(batch.is_empty());
    }
    assert!(store.peek_items(WorkSource::Inbox).unwrap().is_empty());
    assert_eq!(store.dedup_len().unwrap(), 1);
}

// --- Idempotent completions ---

#[test]
fn identical_completion_twice_is_noop() {
    let (store, _) = store_with_clock();
    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1"))
                .store_outbox(event("m-1", "S"))
                .store_outbox(event("m-2", "S")),
        )
        .unwrap();

    let complete = CoordinationRequest::heartbeat(instance("i-1")).complete(
        WorkSource::Outbox,
        "m-1",
        WorkStatus::PUBLISHED,
    );
    store.coordinate(&complete).unwrap();
    let after_first: Vec<String> = store
        .peek_items(WorkSource::Outbox)
        .unwrap()
        .into_iter()
        .map(|i| i.message_id)
        .collect();

    store.coordinate(&complete).unwrap();
    let after_second: Vec<String> = store
        .peek_items(WorkSource::Outbox)
        .unwrap()
        .into_iter()
        .map(|i| i.message_id)
        .collect();

    assert_eq!(after_first, vec!["m-2".to_string()]);
    assert_eq!(after_first, after_second);
}

// --- Backoff ---

#[test]
fn schedule_strictly_increases_across_consecutive_failures() {
    let (store, clock) = store_with_clock();
    let settings = CoordinationSettings::default().with_base_backoff(Duration::from_millis(100));

    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1"))
                .with_settings(settings.clone())
                .store_outbox(event("m-1", "S")),
        )
        .unwrap();

    let mut schedules = Vec::new();
    for _ in 0..6 {
        store
            .coordinate(
                &CoordinationRequest::heartbeat(instance("i-1"))
                    .with_settings(settings.clone())
                    .fail(WorkSource::Outbox, "m-1", WorkStatus::EMPTY, "publish failed"),
            )
            .unwrap();
        let item = &store.peek_items(WorkSource::Outbox).unwrap()[0];
        schedules.push(item.scheduled_for.unwrap());
        clock.advance(Duration::from_millis(1));
    }

    for pair in schedules.windows(2) {
        assert!(pair[1] > pair[0]);
    }
}

// --- Eviction ---

#[test]
fn dead_instance_is_evicted_and_its_item_reclaimed() {
    let (store, clock) = store_with_clock();
    let settings = CoordinationSettings::default()
        .with_stale_after(Duration::from_secs(60))
        .with_lease_duration(Duration::from_secs(3600));

    // i-dead stores and holds an item, then never heartbeats again.
    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-dead"))
                .with_settings(settings.clone())
                .store_outbox(event("m-1", "S")),
        )
        .unwrap();

    // Before the threshold, the long lease protects the item.
    clock.advance(Duration::from_secs(59));
    let batch = store
        .coordinate(&CoordinationRequest::heartbeat(instance("i-live")).with_settings(settings.clone()))
        .unwrap();
    assert!(batch.is_empty());
    assert_eq!(store.peek_instances().unwrap().len(), 2);

    // Past the threshold: evicted, lease released, item claimed with no
    // holder handover in between.
    clock.advance(Duration::from_secs(2));
    let batch = store
        .coordinate(&CoordinationRequest::heartbeat(instance("i-live")).with_settings(settings))
        .unwrap();
    assert_eq!(store.peek_instances().unwrap().len(), 1);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.items()[0].message_id, "m-1");
    assert!(!batch.items()[0].newly_stored);
}

// --- Stream ordering across instances ---

#[test]
fn later_item_never_claimed_while_earlier_in_flight_anywhere() {
    let (store, clock) = store_with_clock();
    let settings = CoordinationSettings::default()
        .with_lease_duration(Duration::from_secs(30))
        .with_stale_after(Duration::from_secs(3600));

    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1"))
                .with_settings(settings.clone())
                .store_outbox(event("a", "S")),
        )
        .unwrap();
    clock.advance(Duration::from_secs(1));
    store
        .coordinate(
            &CoordinationRequest::heartbeat(instance("i-1"))
                .with_settings(settings.clone())
                .store_outbox(event("b", "S")),
        )
        .unwrap();

    // Leases lapse; several instances race the claim. Whoever owns the
    // partition gets A alone; B is returned by nobody.
    clock.advance(Duration::from_secs(31));
    let mut claimed_ids = Vec::new();
    for id in ["i-1", "i-2", "i-3"] {
        let batch = store
            .coordinate(&CoordinationRequest::heartbeat(instance(id)).with_settings(settings.clone()))
            .unwrap();
        claimed_ids.extend(batch.iter().map(|w| w.message_id.clone()));
    }
    assert_eq!(claimed_ids, vec!["a".to_string()]);
}
