use std::sync::Arc;
use std::time::Duration;

use relayed_rust::{
    owns, partition_for, rank_of, CoordinationRequest, CoordinationSettings, CoordinationStore,
    InMemoryCoordinationStore, ManualClock, NewWorkMessage, ServiceInstance, WorkSource,
    DEFAULT_PARTITION_COUNT,
};

// --- Pure ownership arithmetic ---

#[test]
fn partitions_are_stable_across_instances() {
    // Two "instances" computing placement independently must agree.
    for stream in ["orders-17", "payments-3", "shipments-99"] {
        let a = partition_for(stream, DEFAULT_PARTITION_COUNT);
        let b = partition_for(stream, DEFAULT_PARTITION_COUNT);
        assert_eq!(a, b);
        assert!(a < DEFAULT_PARTITION_COUNT);
    }
}

#[test]
fn every_partition_has_exactly_one_owner_for_any_active_set() {
    for active_count in 1..=7 {
        let active_ids: Vec<String> = (0..active_count).map(|i| format!("i-{}", i)).collect();

        for partition in 0..DEFAULT_PARTITION_COUNT {
            let owners = active_ids
                .iter()
                .filter(|id| {
                    let rank = rank_of(id, &active_ids).unwrap();
                    owns(partition, active_count, rank)
                })
                .count();
            assert_eq!(owners, 1);
        }
    }
}

#[test]
fn second_instance_takes_roughly_half() {
    let active_ids = vec!["i-1".to_string(), "i-2".to_string()];
    let rank_two = rank_of("i-2", &active_ids).unwrap();

    let owned = (0..DEFAULT_PARTITION_COUNT)
        .filter(|p| owns(*p, 2, rank_two))
        .count();
    assert_eq!(owned, DEFAULT_PARTITION_COUNT as usize / 2);
}

// --- Join scenario against the store ---

#[test]
fn join_splits_ownership_without_stealing_live_leases() {
    let clock = ManualClock::default();
    let store = InMemoryCoordinationStore::with_clock(Arc::new(clock.clone()));
    let settings = CoordinationSettings::default()
        .with_lease_duration(Duration::from_secs(30))
        .with_batch_size(1000);

    // Sole instance i-1 owns everything: it claims all orphans seeded
    // across many streams.
    for i in 0..40 {
        store
            .track(
                WorkSource::Receptor,
                &NewWorkMessage::new(
                    format!("t-{}", i),
                    "tracker",
                    "Tracked",
                    vec![],
                    format!("stream-{}", i),
                ),
                settings.partition_count,
            )
            .unwrap();
    }
    let batch = store
        .coordinate(
            &CoordinationRequest::heartbeat(ServiceInstance::new("i-1", "svc"))
                .with_settings(settings.clone()),
        )
        .unwrap();
    assert_eq!(batch.len(), 40);
    assert_eq!(batch.active_instances, 1);

    // i-2 joins and heartbeats. Every row is still leased by i-1, so the
    // join claims nothing yet: no lease is reassigned before it expires.
    let batch = store
        .coordinate(
            &CoordinationRequest::heartbeat(ServiceInstance::new("i-2", "svc"))
                .with_settings(settings.clone()),
        )
        .unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.active_instances, 2);

    // Leases lapse naturally; now the two instances split the rows by
    // rank parity of their partitions.
    clock.advance(Duration::from_secs(31));
    let batch_one = store
        .coordinate(
            &CoordinationRequest::heartbeat(ServiceInstance::new("i-1", "svc"))
                .with_settings(settings.clone()),
        )
        .unwrap();
    let batch_two = store
        .coordinate(
            &CoordinationRequest::heartbeat(ServiceInstance::new("i-2", "svc"))
                .with_settings(settings.clone()),
        )
        .unwrap();

    assert_eq!(batch_one.len() + batch_two.len(), 40);
    assert!(batch_one.len() > 0 && batch_two.len() > 0);

    // The split matches the arithmetic exactly.
    let active_ids = vec!["i-1".to_string(), "i-2".to_string()];
    for (id, batch) in [("i-1", &batch_one), ("i-2", &batch_two)] {
        let rank = rank_of(id, &active_ids).unwrap();
        for work in batch.iter() {
            assert!(owns(work.partition, 2, rank));
        }
    }
}
