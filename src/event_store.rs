use std::collections::HashMap;
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::work_item::PayloadError;

/// An event appended to the integrated event store.
///
/// `(stream_id, version)` is the optimistic-concurrency key: versions are
/// dense per stream (each event is exactly one higher than the last, even
/// when several same-stream events land in one batch), and re-appending an
/// existing `(stream, version)` is a no-op. `sequence` orders events
/// globally across all streams.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventStoreRecord {
    /// The originating message id.
    pub event_id: String,
    pub stream_id: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
    /// Monotonic global sequence number.
    pub sequence: u64,
    /// Per-stream version, starting at 1.
    pub version: u64,
    pub appended_at: SystemTime,
}

impl EventStoreRecord {
    /// Decode the payload into a concrete event type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        bitcode::deserialize(&self.payload).map_err(|e| PayloadError {
            message: e.to_string(),
        })
    }
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
