mod coordinator;
mod thread;

pub use coordinator::{Coordinator, CycleOutcome};
pub use thread::{CoordinatorThread, LoopStats};
