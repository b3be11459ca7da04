use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::instance::ServiceInstance;
use crate::partition::DEFAULT_PARTITION_COUNT;
use crate::status::WorkStatus;
use crate::work_item::{NewWorkMessage, WorkSource};

/// Tuning parameters for one coordination call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSettings {
    /// How long a claim keeps other instances off a work item.
    pub lease_duration: Duration,
    /// Heartbeat age beyond which an instance is evicted.
    pub stale_after: Duration,
    /// Number of virtual partitions streams hash into.
    pub partition_count: u32,
    /// First retry delay; doubles per failed attempt up to the cap.
    pub base_backoff: Duration,
    /// Dead-letter a row after this many failed attempts. `None` retries
    /// forever.
    pub dead_letter_after: Option<u32>,
    /// Maximum rows claimed (not counting fresh inserts) per call.
    pub batch_size: usize,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        CoordinationSettings {
            lease_duration: Duration::from_secs(60),
            stale_after: Duration::from_secs(120),
            partition_count: DEFAULT_PARTITION_COUNT,
            base_backoff: Duration::from_secs(1),
            dead_letter_after: None,
            batch_size: 100,
        }
    }
}

impl CoordinationSettings {
    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_stale_after(mut self, stale: Duration) -> Self {
        self.stale_after = stale;
        self
    }

    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count.max(1);
        self
    }

    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn with_dead_letter_after(mut self, attempts: u32) -> Self {
        self.dead_letter_after = Some(attempts);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// A successfully handled work item: the status bits to OR in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub source: WorkSource,
    pub message_id: String,
    pub status: WorkStatus,
}

/// A failed work item: the bits to OR in plus the error text to record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub source: WorkSource,
    pub message_id: String,
    pub status: WorkStatus,
    pub error: String,
}

/// Everything one instance brings to a coordination call: its identity,
/// the outcomes of the previous cycle, new work to persist, and the ids of
/// buffered items whose leases should only be renewed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinationRequest {
    pub instance: ServiceInstance,
    pub settings: CoordinationSettings,
    pub completions: Vec<Completion>,
    pub failures: Vec<Failure>,
    pub new_outbox: Vec<NewWorkMessage>,
    pub new_inbox: Vec<NewWorkMessage>,
    /// Ids still held by this instance, pending a downstream dependency.
    /// The lease is extended, nothing else changes, and the row is not
    /// re-returned.
    pub renew_only: Vec<String>,
}

impl CoordinationRequest {
    /// A bare heartbeat: no outcomes, no new work.
    pub fn heartbeat(instance: ServiceInstance) -> Self {
        CoordinationRequest {
            instance,
            settings: CoordinationSettings::default(),
            completions: Vec::new(),
            failures: Vec::new(),
            new_outbox: Vec::new(),
            new_inbox: Vec::new(),
            renew_only: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: CoordinationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn complete(
        mut self,
        source: WorkSource,
        message_id: impl Into<String>,
        status: WorkStatus,
    ) -> Self {
        self.completions.push(Completion {
            source,
            message_id: message_id.into(),
            status,
        });
        self
    }

    pub fn fail(
        mut self,
        source: WorkSource,
        message_id: impl Into<String>,
        status: WorkStatus,
        error: impl Into<String>,
    ) -> Self {
        self.failures.push(Failure {
            source,
            message_id: message_id.into(),
            status,
            error: error.into(),
        });
        self
    }

    pub fn store_outbox(mut self, message: NewWorkMessage) -> Self {
        self.new_outbox.push(message);
        self
    }

    pub fn receive_inbox(mut self, message: NewWorkMessage) -> Self {
        self.new_inbox.push(message);
        self
    }

    pub fn renew(mut self, message_id: impl Into<String>) -> Self {
        self.renew_only.push(message_id.into());
        self
    }

    /// Whether this call carries anything beyond the heartbeat.
    pub fn is_heartbeat_only(&self) -> bool {
        self.completions.is_empty()
            && self.failures.is_empty()
            && self.new_outbox.is_empty()
            && self.new_inbox.is_empty()
            && self.renew_only.is_empty()
    }
}
