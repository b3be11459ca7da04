use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relayed_rust::{
    ClaimedWork, Coordinator, CoordinationSettings, HandlerOutcome, InMemoryCoordinationStore,
    ManualClock, NewWorkMessage, ParallelExecution, ServiceInstance, WorkHandler, WorkSource,
};

fn success_handler(log: Arc<Mutex<Vec<String>>>) -> Arc<dyn WorkHandler> {
    Arc::new(move |work: &ClaimedWork| {
        log.lock().unwrap().push(work.message_id.clone());
        HandlerOutcome::Success
    })
}

// --- Single-instance drain ---

#[test]
fn produce_handle_retire_full_cycle() {
    let store = InMemoryCoordinationStore::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut coordinator = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-1", "svc"),
        success_handler(log.clone()),
    );

    for i in 0..3 {
        coordinator
            .enqueue_outbox(NewWorkMessage::new(
                format!("m-{}", i),
                "orders-out",
                "OrderPlaced",
                vec![i],
                "order-1",
            ))
            .unwrap();
    }

    // Tick 1: persist, claim, handle in stream order.
    let outcome = coordinator.tick().unwrap();
    assert_eq!(outcome.stored, 3);
    assert_eq!(outcome.succeeded, 3);
    assert_eq!(*log.lock().unwrap(), vec!["m-0", "m-1", "m-2"]);

    // Tick 2: completions retire all rows.
    coordinator.tick().unwrap();
    assert!(store.peek_items(WorkSource::Outbox).unwrap().is_empty());
}

// --- Two instances sharing a store ---

#[test]
fn crashed_holder_work_resumes_on_the_survivor() {
    let clock = ManualClock::default();
    let store = InMemoryCoordinationStore::with_clock(Arc::new(clock.clone()));
    let settings = CoordinationSettings::default()
        .with_lease_duration(Duration::from_secs(10))
        .with_stale_after(Duration::from_secs(20));

    // A producer stores a message and then "crashes": the outcome it
    // buffered is never reported back.
    let crash_handler: Arc<dyn WorkHandler> = Arc::new(|_: &ClaimedWork| HandlerOutcome::Success);
    let mut producer = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-crash", "svc"),
        crash_handler,
    )
    .with_settings(settings.clone());
    producer
        .enqueue_outbox(NewWorkMessage::new("m-1", "orders-out", "T", vec![1], "s-1"))
        .unwrap();
    producer.tick().unwrap();

    // The survivor ticks past the stale threshold and picks the item up.
    let survivor_log = Arc::new(Mutex::new(Vec::new()));
    let mut survivor = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-live", "svc"),
        success_handler(survivor_log.clone()),
    )
    .with_settings(settings.clone());

    clock.advance(Duration::from_secs(21));
    let outcome = survivor.tick().unwrap();
    assert_eq!(outcome.claimed, 1);
    assert_eq!(*survivor_log.lock().unwrap(), vec!["m-1"]);

    // Survivor's completion retires it durably.
    survivor.tick().unwrap();
    assert!(store.peek_items(WorkSource::Outbox).unwrap().is_empty());
}

// --- Retry path end to end ---

#[test]
fn flaky_handler_succeeds_on_second_attempt() {
    let clock = ManualClock::default();
    let store = InMemoryCoordinationStore::with_clock(Arc::new(clock.clone()));
    let settings = CoordinationSettings::default()
        .with_base_backoff(Duration::from_secs(1))
        .with_lease_duration(Duration::from_secs(5));

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let handler: Arc<dyn WorkHandler> = Arc::new(move |_: &ClaimedWork| {
        if handler_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            HandlerOutcome::Retry("transport timeout".to_string())
        } else {
            HandlerOutcome::Success
        }
    });

    let mut coordinator = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-1", "svc"),
        handler,
    )
    .with_settings(settings);

    coordinator
        .enqueue_outbox(NewWorkMessage::new("m-1", "orders-out", "T", vec![1], "s-1"))
        .unwrap();

    // First attempt fails.
    let outcome = coordinator.tick().unwrap();
    assert_eq!(outcome.failed, 1);

    // The failure lands; the row is backed off, not claimable yet.
    let outcome = coordinator.tick().unwrap();
    assert_eq!(outcome.claimed, 0);
    let item = &store.peek_items(WorkSource::Outbox).unwrap()[0];
    assert_eq!(item.attempts, 1);
    assert_eq!(item.error.as_deref(), Some("transport timeout"));

    // After the backoff, the second attempt succeeds and the row retires.
    clock.advance(Duration::from_secs(3));
    let outcome = coordinator.tick().unwrap();
    assert_eq!(outcome.succeeded, 1);
    coordinator.tick().unwrap();
    assert!(store.peek_items(WorkSource::Outbox).unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// --- Dead-letter path end to end ---

#[test]
fn poison_message_parks_after_threshold() {
    let clock = ManualClock::default();
    let store = InMemoryCoordinationStore::with_clock(Arc::new(clock.clone()));
    let settings = CoordinationSettings::default()
        .with_base_backoff(Duration::from_millis(10))
        .with_dead_letter_after(3);

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let handler: Arc<dyn WorkHandler> = Arc::new(move |_: &ClaimedWork| {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        HandlerOutcome::Failure("cannot deserialize envelope".to_string())
    });

    let mut coordinator = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-1", "svc"),
        handler,
    )
    .with_settings(settings);

    coordinator
        .enqueue_inbox(NewWorkMessage::new("in-1", "handler", "T", vec![1], "s-1"))
        .unwrap();

    // Keep ticking past every backoff until the row is parked.
    for _ in 0..12 {
        coordinator.tick().unwrap();
        clock.advance(Duration::from_secs(1));
    }

    let items = store.peek_items(WorkSource::Inbox).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(items[0].error.as_deref(), Some("cannot deserialize envelope"));

    // Parked for good: many more ticks change nothing.
    for _ in 0..5 {
        coordinator.tick().unwrap();
        clock.advance(Duration::from_secs(60));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// --- Parallel strategy end to end ---

#[test]
fn parallel_execution_preserves_stream_order() {
    let store = InMemoryCoordinationStore::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut coordinator = Coordinator::new(
        store.clone(),
        ServiceInstance::new("i-1", "svc"),
        success_handler(log.clone()),
    )
    .with_strategy(ParallelExecution::new().with_max_width(4));

    for stream in ["a", "b", "c"] {
        for i in 0..3 {
            coordinator
                .enqueue_outbox(NewWorkMessage::new(
                    format!("{}-{}", stream, i),
                    "dest",
                    "T",
                    vec![],
                    stream,
                ))
                .unwrap();
        }
    }

    let outcome = coordinator.tick().unwrap();
    assert_eq!(outcome.succeeded, 9);

    // Interleaving across streams is free; order within a stream is not.
    let log = log.lock().unwrap();
    for stream in ["a", "b", "c"] {
        let run: Vec<&String> = log.iter().filter(|id| id.starts_with(stream)).collect();
        assert_eq!(
            run,
            vec![
                &format!("{}-0", stream),
                &format!("{}-1", stream),
                &format!("{}-2", stream)
            ]
        );
    }
}
