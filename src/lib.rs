mod client;
mod clock;
mod coordination;
mod error;
mod event_store;
mod execution;
mod instance;
mod partition;
mod status;
mod stream_key;
mod work_item;

pub use client::{Coordinator, CoordinatorThread, CycleOutcome, LoopStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordination::{
    ClaimedWork, Completion, CoordinationRequest, CoordinationSettings, CoordinationStore,
    Failure, InMemoryCoordinationStore, WorkBatch,
};
pub use error::CoordinationError;
pub use event_store::EventStoreRecord;
pub use execution::{
    ExecutionStrategy, HandlerOutcome, OutcomeReport, ParallelExecution, SerialExecution,
    WorkHandler,
};
pub use instance::ServiceInstance;
pub use partition::{owns, partition_for, rank_of, stable_hash, DEFAULT_PARTITION_COUNT};
pub use status::{next_attempt_delay, WorkStatus, MAX_BACKOFF};
pub use stream_key::{StreamKeyError, StreamKeyFn, StreamKeyRegistry};
pub use work_item::{DeduplicationRecord, NewWorkMessage, PayloadError, WorkItem, WorkSource};
