use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    LockPoisoned(&'static str),
    /// The storage layer could not be reached; the cycle should be retried,
    /// never treated as fatal.
    StorageUnavailable(String),
    InvalidRequest(String),
}

impl fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinationError::LockPoisoned(operation) => {
                write!(f, "coordination store lock poisoned during {}", operation)
            }
            CoordinationError::StorageUnavailable(reason) => {
                write!(f, "storage unavailable: {}", reason)
            }
            CoordinationError::InvalidRequest(reason) => {
                write!(f, "invalid coordination request: {}", reason)
            }
        }
    }
}

impl std::error::Error for CoordinationError {}
