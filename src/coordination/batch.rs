use std::collections::HashMap;
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::status::WorkStatus;
use crate::work_item::{PayloadError, WorkItem, WorkSource};

/// One row handed back from a coordination call: either freshly persisted
/// by this caller or reclaimed from an expired lease.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimedWork {
    pub source: WorkSource,
    pub message_id: String,
    pub destination: String,
    pub envelope_type: String,
    #[serde(with = "payload_serde")]
    pub payload: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub stream_id: String,
    pub partition: u32,
    pub attempts: u32,
    pub status: WorkStatus,
    /// `true` when this call inserted the row; `false` when it was claimed
    /// from an expired or absent lease.
    pub newly_stored: bool,
    pub created_at: SystemTime,
}

impl ClaimedWork {
    pub(crate) fn from_item(source: WorkSource, item: &WorkItem, newly_stored: bool) -> Self {
        ClaimedWork {
            source,
            message_id: item.message_id.clone(),
            destination: item.destination.clone(),
            envelope_type: item.envelope_type.clone(),
            payload: item.payload.clone(),
            metadata: item.metadata.clone(),
            stream_id: item.stream_id.clone(),
            partition: item.partition,
            attempts: item.attempts,
            status: item.status,
            newly_stored,
            created_at: item.created_at,
        }
    }

    /// Stream-ordering sort key: same-stream rows sort by creation.
    pub fn sort_key(&self) -> (&str, SystemTime, &str) {
        (&self.stream_id, self.created_at, &self.message_id)
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        bitcode::deserialize(&self.payload).map_err(|e| PayloadError {
            message: e.to_string(),
        })
    }
}

/// The ordered result of one coordination call.
///
/// Contains only rows newly inserted or newly claimed by that call; rows
/// merely renewed or already held from before are not re-returned, so a
/// caller never sees the same delivery twice.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkBatch {
    items: Vec<ClaimedWork>,
    /// Size of the active-instance set the call observed (includes the
    /// caller, never zero).
    pub active_instances: usize,
}

impl WorkBatch {
    pub(crate) fn new(mut items: Vec<ClaimedWork>, active_instances: usize) -> Self {
        items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        WorkBatch {
            items,
            active_instances,
        }
    }

    pub fn items(&self) -> &[ClaimedWork] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClaimedWork> {
        self.items.iter()
    }

    /// The batch split into per-stream runs, preserving in-stream order.
    /// Insertion order of the groups follows first appearance in the batch.
    pub fn by_stream(&self) -> Vec<(&str, Vec<&ClaimedWork>)> {
        let mut groups: Vec<(&str, Vec<&ClaimedWork>)> = Vec::new();
        for item in &self.items {
            match groups.iter_mut().find(|(stream, _)| *stream == item.stream_id) {
                Some((_, run)) => run.push(item),
                None => groups.push((&item.stream_id, vec![item])),
            }
        }
        groups
    }
}

impl IntoIterator for WorkBatch {
    type Item = ClaimedWork;
    type IntoIter = std::vec::IntoIter<ClaimedWork>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
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
