use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::status::WorkStatus;

/// Error when decoding a work item or event payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadError {
    pub message: String,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payload error: {}", self.message)
    }
}

impl std::error::Error for PayloadError {}

/// Which table a work item lives in.
///
/// `Receptor` and `Checkpoint` are tracking rows that share the full
/// completion/failure/claim lifecycle of outbox and inbox rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkSource {
    Outbox,
    Inbox,
    Receptor,
    Checkpoint,
}

impl WorkSource {
    pub const ALL: [WorkSource; 4] = [
        WorkSource::Outbox,
        WorkSource::Inbox,
        WorkSource::Receptor,
        WorkSource::Checkpoint,
    ];
}

impl fmt::Display for WorkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkSource::Outbox => write!(f, "outbox"),
            WorkSource::Inbox => write!(f, "inbox"),
            WorkSource::Receptor => write!(f, "receptor"),
            WorkSource::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// Durable unit of work: a message waiting to be published (outbox) or
/// handled (inbox), plus the lease and retry bookkeeping around it.
///
/// Rows are deleted only on terminal success; failures keep the row and
/// push `scheduled_for` out exponentially.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Globally unique message id.
    pub message_id: String,
    /// Destination endpoint (outbox) or handler name (inbox).
    pub destination: String,
    /// Envelope type name; the codec's key for the opaque payload.
    pub envelope_type: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    /// First-hop metadata (correlation ids, trace context, ...).
    pub metadata: HashMap<String, String>,
    pub stream_id: String,
    pub partition: u32,
    /// Whether this message is also appended to the event store.
    pub is_event: bool,
    pub status: WorkStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub lease_holder: Option<String>,
    pub lease_expires_at: Option<SystemTime>,
    /// Earliest instant the row may be claimed again (backoff).
    pub scheduled_for: Option<SystemTime>,
    pub created_at: SystemTime,
}

impl WorkItem {
    /// Whether the row holds an unexpired lease at `now`.
    pub fn leased_at(&self, now: SystemTime) -> bool {
        self.lease_holder.is_some()
            && self.lease_expires_at.map(|until| until > now).unwrap_or(false)
    }

    /// Whether the row's backoff schedule still holds it back at `now`.
    pub fn scheduled_after(&self, now: SystemTime) -> bool {
        self.scheduled_for.map(|at| at > now).unwrap_or(false)
    }

    /// Clear lease holder and expiry, making the row reclaimable.
    pub fn release(&mut self) {
        self.lease_holder = None;
        self.lease_expires_at = None;
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        bitcode::deserialize(&self.payload).map_err(|e| PayloadError {
            message: e.to_string(),
        })
    }
}

/// Producer-side description of a message to persist on the next cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewWorkMessage {
    pub message_id: String,
    pub destination: String,
    pub envelope_type: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub stream_id: String,
    pub is_event: bool,
}

impl NewWorkMessage {
    pub fn new(
        message_id: impl Into<String>,
        destination: impl Into<String>,
        envelope_type: impl Into<String>,
        payload: Vec<u8>,
        stream_id: impl Into<String>,
    ) -> Self {
        NewWorkMessage {
            message_id: message_id.into(),
            destination: destination.into(),
            envelope_type: envelope_type.into(),
            payload,
            metadata: HashMap::new(),
            stream_id: stream_id.into(),
            is_event: false,
        }
    }

    /// Encode a typed payload with the compact codec.
    pub fn encoded<T: Serialize>(
        message_id: impl Into<String>,
        destination: impl Into<String>,
        envelope_type: impl Into<String>,
        payload: &T,
        stream_id: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        let bytes = bitcode::serialize(payload).map_err(|e| PayloadError {
            message: e.to_string(),
        })?;
        Ok(Self::new(message_id, destination, envelope_type, bytes, stream_id))
    }

    /// Flag this message for event-store append.
    pub fn as_event(mut self) -> Self {
        self.is_event = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Permanent record that an inbound message id has been seen.
///
/// Append-only forever; written exactly once per id, independent of whether
/// the corresponding inbox row still exists. This is what makes inbound
/// delivery effectively-once across the item's full lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationRecord {
    pub message_id: String,
    pub first_seen_at: SystemTime,
}

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(payload: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(payload).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
