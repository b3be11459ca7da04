use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A live (or recently live) process participating in coordination.
///
/// Upserted on every coordination cycle; any live instance deletes rows
/// whose heartbeat has gone stale and releases the work they held.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Stable per-process identifier, unique across the fleet.
    pub instance_id: String,
    pub service_name: String,
    pub host: String,
    pub pid: u32,
    pub started_at: SystemTime,
    /// Maintained by the store; the caller-supplied value is ignored.
    pub last_heartbeat: SystemTime,
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(instance_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        let now = SystemTime::now();
        ServiceInstance {
            instance_id: instance_id.into(),
            service_name: service_name.into(),
            host: String::new(),
            pid: std::process::id(),
            started_at: now,
            last_heartbeat: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
