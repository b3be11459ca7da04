use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::CoordinationError;
use crate::event_store::EventStoreRecord;
use crate::instance::ServiceInstance;
use crate::partition::{owns, partition_for, rank_of};
use crate::status::{next_attempt_delay, WorkStatus};
use crate::work_item::{DeduplicationRecord, NewWorkMessage, WorkItem, WorkSource};

use super::batch::{ClaimedWork, WorkBatch};
use super::request::CoordinationRequest;
use super::store::CoordinationStore;

/// One work table per source. Vec order is insertion order, which doubles
/// as the tiebreak for "earlier-created" when timestamps collide.
#[derive(Default)]
struct Tables {
    outbox: Vec<WorkItem>,
    inbox: Vec<WorkItem>,
    receptor: Vec<WorkItem>,
    checkpoint: Vec<WorkItem>,
}

impl Tables {
    fn get(&self, source: WorkSource) -> &Vec<WorkItem> {
        match source {
            WorkSource::Outbox => &self.outbox,
            WorkSource::Inbox => &self.inbox,
            WorkSource::Receptor => &self.receptor,
            WorkSource::Checkpoint => &self.checkpoint,
        }
    }

    fn get_mut(&mut self, source: WorkSource) -> &mut Vec<WorkItem> {
        match source {
            WorkSource::Outbox => &mut self.outbox,
            WorkSource::Inbox => &mut self.inbox,
            WorkSource::Receptor => &mut self.receptor,
            WorkSource::Checkpoint => &mut self.checkpoint,
        }
    }
}

#[derive(Default)]
struct State {
    instances: HashMap<String, ServiceInstance>,
    tables: Tables,
    dedup: HashMap<String, DeduplicationRecord>,
    events: Vec<EventStoreRecord>,
    event_keys: HashSet<(String, u64)>,
    stream_versions: HashMap<String, u64>,
}

/// In-memory reference implementation of the coordination transaction.
///
/// Every instance in a process (or test) shares one of these through
/// `Clone`; multiple logical instances coordinating against the same store
/// behave exactly like separate processes sharing a database. All twelve
/// ordered effects run under a single write lock, which is the in-memory
/// stand-in for a serializable transaction: the operation is all-or-nothing
/// with respect to every other call.
#[derive(Clone)]
pub struct InMemoryCoordinationStore {
    state: Arc<RwLock<State>>,
    sequence: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use an injected clock; tests pair this with `ManualClock` to drive
    /// lease expiry and heartbeat staleness deterministically.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryCoordinationStore {
            state: Arc::new(RwLock::new(State::default())),
            sequence: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Snapshot a work table. Operator/test surface, not part of the
    /// coordination contract.
    pub fn peek_items(&self, source: WorkSource) -> Result<Vec<WorkItem>, CoordinationError> {
        let state = self
            .state
            .read()
            .map_err(|_| CoordinationError::LockPoisoned("peek items"))?;
        Ok(state.tables.get(source).clone())
    }

    /// Snapshot the event store, globally ordered.
    pub fn peek_events(&self) -> Result<Vec<EventStoreRecord>, CoordinationError> {
        let state = self
            .state
            .read()
            .map_err(|_| CoordinationError::LockPoisoned("peek events"))?;
        Ok(state.events.clone())
    }

    /// Snapshot the registered instances.
    pub fn peek_instances(&self) -> Result<Vec<ServiceInstance>, CoordinationError> {
        let state = self
            .state
            .read()
            .map_err(|_| CoordinationError::LockPoisoned("peek instances"))?;
        Ok(state.instances.values().cloned().collect())
    }

    /// Number of ids in the permanent dedup ledger.
    pub fn dedup_len(&self) -> Result<usize, CoordinationError> {
        let state = self
            .state
            .read()
            .map_err(|_| CoordinationError::LockPoisoned("dedup len"))?;
        Ok(state.dedup.len())
    }

    /// Insert an unleased receptor or checkpoint tracking row.
    ///
    /// Real drivers create these from their receptor/perspective layers;
    /// the row then flows through the same completion, failure, and claim
    /// lifecycle as outbox and inbox rows.
    pub fn track(
        &self,
        source: WorkSource,
        message: &NewWorkMessage,
        partition_count: u32,
    ) -> Result<(), CoordinationError> {
        let now = self.clock.now();
        let mut state = self
            .state
            .write()
            .map_err(|_| CoordinationError::LockPoisoned("track"))?;
        let table = state.tables.get_mut(source);
        if table
            .iter()
            .any(|item| item.message_id == message.message_id)
        {
            return Ok(());
        }
        table.push(WorkItem {
            message_id: message.message_id.clone(),
            destination: message.destination.clone(),
            envelope_type: message.envelope_type.clone(),
            payload: message.payload.clone(),
            metadata: message.metadata.clone(),
            stream_id: message.stream_id.clone(),
            partition: partition_for(&message.stream_id, partition_count),
            is_event: false,
            status: WorkStatus::STORED,
            attempts: 0,
            error: None,
            lease_holder: None,
            lease_expires_at: None,
            scheduled_for: None,
            created_at: now,
        });
        Ok(())
    }
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationStore for InMemoryCoordinationStore {
    fn coordinate(&self, request: &CoordinationRequest) -> Result<WorkBatch, CoordinationError> {
        if request.instance.instance_id.is_empty() {
            return Err(CoordinationError::InvalidRequest(
                "instance id must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let settings = &request.settings;
        let self_id = request.instance.instance_id.clone();

        let mut state = self
            .state
            .write()
            .map_err(|_| CoordinationError::LockPoisoned("coordinate"))?;

        // 1. Upsert the caller's heartbeat. The store's clock is
        // authoritative; whatever heartbeat the caller sent is discarded.
        let mut instance = request.instance.clone();
        instance.last_heartbeat = now;
        state.instances.insert(self_id.clone(), instance);

        // 2. Evict instances whose heartbeat has gone stale and release
        // any work they still held.
        let stale: Vec<String> = state
            .instances
            .values()
            .filter(|i| i.last_heartbeat + settings.stale_after < now)
            .map(|i| i.instance_id.clone())
            .collect();
        for id in &stale {
            state.instances.remove(id);
        }
        if !stale.is_empty() {
            warn!(evicted = stale.len(), by = %self_id, "evicted stale instances");
            for source in WorkSource::ALL {
                for item in state.tables.get_mut(source).iter_mut() {
                    if item
                        .lease_holder
                        .as_deref()
                        .map(|holder| stale.iter().any(|id| id == holder))
                        .unwrap_or(false)
                    {
                        item.release();
                    }
                }
            }
        }

        // 3. Active-instance set as of this call. Includes self, never empty.
        let mut active_ids: Vec<String> = state.instances.keys().cloned().collect();
        active_ids.sort_unstable();
        let active_count = active_ids.len().max(1);

        // Rows pushed into a terminal or failed state by this call must not
        // be claimed back by the same call.
        let mut touched: HashSet<(WorkSource, String)> = HashSet::new();

        // 4 + 6. Apply completions. OR the bits in; a terminal row is
        // deleted, a partial one has its ownership cleared for reclaim.
        // Re-applying a completion for a row that is already gone is a no-op.
        for completion in &request.completions {
            let table = state.tables.get_mut(completion.source);
            if let Some(pos) = table
                .iter()
                .position(|item| item.message_id == completion.message_id)
            {
                let item = &mut table[pos];
                item.status = item.status.merge(completion.status);
                if item.status.is_terminal_for(completion.source) {
                    touched.insert((completion.source, completion.message_id.clone()));
                    table.remove(pos);
                } else {
                    item.error = None;
                    item.release();
                }
            }
        }

        // 5 + 6. Apply failures: record the error, count the attempt, push
        // the row out exponentially, release ownership. Rows are never
        // deleted on failure; past the dead-letter threshold they are
        // parked instead.
        for failure in &request.failures {
            let table = state.tables.get_mut(failure.source);
            if let Some(item) = table
                .iter_mut()
                .find(|item| item.message_id == failure.message_id)
            {
                item.status = item.status.merge(WorkStatus::FAILED).merge(failure.status);
                item.attempts = item.attempts.saturating_add(1);
                item.error = Some(failure.error.clone());
                item.release();

                let dead = settings
                    .dead_letter_after
                    .map(|limit| item.attempts >= limit)
                    .unwrap_or(false);
                if dead {
                    item.status = item.status.merge(WorkStatus::DEAD_LETTERED);
                    item.scheduled_for = None;
                    warn!(message_id = %item.message_id, attempts = item.attempts, "dead-lettered");
                } else {
                    item.scheduled_for =
                        Some(now + next_attempt_delay(settings.base_backoff, item.attempts));
                }
                touched.insert((failure.source, failure.message_id.clone()));
            }
        }

        // 7. Renew leases for buffered-but-undelivered items. Only rows this
        // caller still holds are extended; anything reclaimed in the
        // meantime is left alone, so a lagging caller cannot steal work
        // back by renewing.
        for message_id in &request.renew_only {
            for source in WorkSource::ALL {
                if let Some(item) = state
                    .tables
                    .get_mut(source)
                    .iter_mut()
                    .find(|item| item.message_id == *message_id)
                {
                    if item.lease_holder.as_deref() == Some(self_id.as_str()) {
                        item.lease_expires_at = Some(now + settings.lease_duration);
                    }
                }
            }
        }

        // 8 + 9. Insert new work. Outbox rows rely on producer-side
        // idempotence (unique message id only); inbox rows must first win
        // the permanent dedup ledger — ids already recorded are dropped
        // silently even when their original row is long gone.
        let mut inserted: Vec<(WorkSource, String)> = Vec::new();
        let mut appendable: Vec<NewWorkMessage> = Vec::new();

        for message in &request.new_outbox {
            if insert_work(
                state.tables.get_mut(WorkSource::Outbox),
                message,
                &self_id,
                now,
                settings.partition_count,
                settings.lease_duration,
            ) {
                inserted.push((WorkSource::Outbox, message.message_id.clone()));
                if message.is_event {
                    appendable.push(message.clone());
                }
            }
        }

        for message in &request.new_inbox {
            if state.dedup.contains_key(&message.message_id) {
                debug!(message_id = %message.message_id, "duplicate inbound dropped");
                continue;
            }
            state.dedup.insert(
                message.message_id.clone(),
                DeduplicationRecord {
                    message_id: message.message_id.clone(),
                    first_seen_at: now,
                },
            );
            if insert_work(
                state.tables.get_mut(WorkSource::Inbox),
                message,
                &self_id,
                now,
                settings.partition_count,
                settings.lease_duration,
            ) {
                inserted.push((WorkSource::Inbox, message.message_id.clone()));
                if message.is_event {
                    appendable.push(message.clone());
                }
            }
        }

        // 10. Append events for event-flagged inserts. Versions are dense
        // per stream: max existing version plus the message's rank within
        // this batch. `(stream, version)` insert-if-absent keeps crash
        // retries from double-appending.
        let mut batch_rank: HashMap<String, u64> = HashMap::new();
        for message in &appendable {
            let rank = batch_rank.entry(message.stream_id.clone()).or_insert(0);
            *rank += 1;
            let base = state
                .stream_versions
                .get(&message.stream_id)
                .copied()
                .unwrap_or(0);
            let version = base + *rank;
            let key = (message.stream_id.clone(), version);
            if state.event_keys.contains(&key) {
                continue;
            }
            state.event_keys.insert(key);
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            state.events.push(EventStoreRecord {
                event_id: message.message_id.clone(),
                stream_id: message.stream_id.clone(),
                aggregate_id: message.stream_id.clone(),
                aggregate_type: message
                    .metadata
                    .get("aggregate_type")
                    .cloned()
                    .unwrap_or_default(),
                event_type: message.envelope_type.clone(),
                payload: message.payload.clone(),
                metadata: message.metadata.clone(),
                sequence,
                version,
                appended_at: now,
            });
        }
        for (stream, rank) in batch_rank {
            let entry = state.stream_versions.entry(stream).or_insert(0);
            *entry += rank;
        }

        // 11. Claim orphaned and newly eligible work this instance owns.
        let rank = rank_of(&self_id, &active_ids).unwrap_or(0);
        let mut claimed: Vec<(WorkSource, String)> = Vec::new();
        let mut budget = settings.batch_size;

        for source in WorkSource::ALL {
            if budget == 0 {
                break;
            }
            let table = state.tables.get_mut(source);
            let mut index = 0;
            while index < table.len() && budget > 0 {
                let claimable = {
                    let item = &table[index];
                    !item.leased_at(now)
                        && !item.status.is_terminal_for(source)
                        && !item.status.contains(WorkStatus::DEAD_LETTERED)
                        && !item.scheduled_after(now)
                        && owns(item.partition, active_count, rank)
                        && !touched.contains(&(source, item.message_id.clone()))
                        && !stream_blocked(table, index, now)
                };
                if claimable {
                    let item = &mut table[index];
                    item.lease_holder = Some(self_id.clone());
                    item.lease_expires_at = Some(now + settings.lease_duration);
                    claimed.push((source, item.message_id.clone()));
                    budget -= 1;
                }
                index += 1;
            }
        }

        // 12. Return only rows newly inserted or newly claimed by this
        // call, in (stream, created) order.
        let mut results: Vec<ClaimedWork> = Vec::new();
        for (source, message_id) in &inserted {
            if let Some(item) = state
                .tables
                .get(*source)
                .iter()
                .find(|item| item.message_id == *message_id)
            {
                results.push(ClaimedWork::from_item(*source, item, true));
            }
        }
        for (source, message_id) in &claimed {
            if inserted.iter().any(|(s, id)| s == source && id == message_id) {
                continue;
            }
            if let Some(item) = state
                .tables
                .get(*source)
                .iter()
                .find(|item| item.message_id == *message_id)
            {
                results.push(ClaimedWork::from_item(*source, item, false));
            }
        }

        debug!(
            instance = %self_id,
            active = active_count,
            inserted = inserted.len(),
            claimed = claimed.len(),
            "coordination cycle"
        );

        Ok(WorkBatch::new(results, active_count))
    }
}

/// Insert a new work row leased to the caller. Returns `false` when a row
/// with the same message id already exists (idempotent re-invocation).
fn insert_work(
    table: &mut Vec<WorkItem>,
    message: &NewWorkMessage,
    instance_id: &str,
    now: SystemTime,
    partition_count: u32,
    lease: std::time::Duration,
) -> bool {
    if table
        .iter()
        .any(|item| item.message_id == message.message_id)
    {
        return false;
    }
    table.push(WorkItem {
        message_id: message.message_id.clone(),
        destination: message.destination.clone(),
        envelope_type: message.envelope_type.clone(),
        payload: message.payload.clone(),
        metadata: message.metadata.clone(),
        stream_id: message.stream_id.clone(),
        partition: partition_for(&message.stream_id, partition_count),
        is_event: message.is_event,
        status: WorkStatus::STORED,
        attempts: 0,
        error: None,
        lease_holder: Some(instance_id.to_string()),
        lease_expires_at: Some(now + lease),
        scheduled_for: None,
        created_at: now,
    });
    true
}

/// Per-stream ordering guard: the row at `index` is blocked while any
/// earlier-created row on the same stream is leased or future-scheduled.
/// Vec position breaks creation-time ties.
fn stream_blocked(table: &[WorkItem], index: usize, now: SystemTime) -> bool {
    let candidate = &table[index];
    table.iter().enumerate().any(|(i, other)| {
        other.stream_id == candidate.stream_id
            && (other.created_at, i) < (candidate.created_at, index)
            && (other.leased_at(now) || other.scheduled_after(now))
    })
}
