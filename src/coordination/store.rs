use crate::error::CoordinationError;

use super::batch::WorkBatch;
use super::request::CoordinationRequest;

/// The storage driver's sole primary verb.
///
/// One call runs the whole coordination transaction — heartbeat, stale
/// eviction, completion/failure application, dedup-gated inserts, event
/// append, and claiming — atomically, and returns the ordered batch of
/// rows this caller should now work on. Relational drivers implement it as
/// a stored procedure or a serializable transaction; non-relational ones
/// as a compare-and-swap loop. Splitting the effects across round trips
/// breaks the mutual-exclusion and ordering invariants, so the trait does
/// not expose anything finer-grained.
pub trait CoordinationStore: Send + Sync {
    fn coordinate(&self, request: &CoordinationRequest) -> Result<WorkBatch, CoordinationError>;
}

impl<S: CoordinationStore + ?Sized> CoordinationStore for std::sync::Arc<S> {
    fn coordinate(&self, request: &CoordinationRequest) -> Result<WorkBatch, CoordinationError> {
        (**self).coordinate(request)
    }
}
