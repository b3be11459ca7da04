mod batch;
mod memory;
mod request;
mod store;

// Request/response contract of the coordination transaction
pub use batch::{ClaimedWork, WorkBatch};
pub use request::{Completion, CoordinationRequest, CoordinationSettings, Failure};

// Storage driver seam
pub use store::CoordinationStore;

// In-memory reference store
pub use memory::InMemoryCoordinationStore;
