//! Explicit mapping of event types to stream-key extractors.
//!
//! Registered once at startup and validated before the coordinator runs,
//! instead of discovering stream keys reflectively at dispatch time.

use std::collections::HashMap;
use std::fmt;

/// Pulls a stream id out of a raw payload for a given event type.
pub type StreamKeyFn = fn(&[u8]) -> Option<String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamKeyError {
    DuplicateEventType(String),
    UnknownEventType(String),
    EmptyRegistry,
}

impl fmt::Display for StreamKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKeyError::DuplicateEventType(event_type) => {
                write!(f, "stream key extractor already registered for {}", event_type)
            }
            StreamKeyError::UnknownEventType(event_type) => {
                write!(f, "no stream key extractor registered for {}", event_type)
            }
            StreamKeyError::EmptyRegistry => write!(f, "stream key registry has no entries"),
        }
    }
}

impl std::error::Error for StreamKeyError {}

/// Static event-type → stream-key-extractor table.
#[derive(Default)]
pub struct StreamKeyRegistry {
    extractors: HashMap<String, StreamKeyFn>,
}

impl StreamKeyRegistry {
    pub fn new() -> Self {
        StreamKeyRegistry {
            extractors: HashMap::new(),
        }
    }

    /// Register an extractor. Duplicate registrations are rejected so a
    /// second handler cannot silently shadow the first.
    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        extractor: StreamKeyFn,
    ) -> Result<(), StreamKeyError> {
        let event_type = event_type.into();
        if self.extractors.contains_key(&event_type) {
            return Err(StreamKeyError::DuplicateEventType(event_type));
        }
        self.extractors.insert(event_type, extractor);
        Ok(())
    }

    /// Startup check: the registry must have at least one entry.
    pub fn validate(&self) -> Result<(), StreamKeyError> {
        if self.extractors.is_empty() {
            return Err(StreamKeyError::EmptyRegistry);
        }
        Ok(())
    }

    /// Resolve the stream id for an event payload. Falls back to `None`
    /// only when the extractor itself declines the payload.
    pub fn stream_for(
        &self,
        event_type: &str,
        payload: &[u8],
    ) -> Result<Option<String>, StreamKeyError> {
        match self.extractors.get(event_type) {
            Some(extractor) => Ok(extractor(payload)),
            None => Err(StreamKeyError::UnknownEventType(event_type.to_string())),
        }
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.extractors.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
