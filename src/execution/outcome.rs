use crate::coordination::ClaimedWork;
use crate::work_item::WorkSource;

/// Explicit result of handling one work item.
///
/// Handlers return this instead of panicking across the execution-strategy
/// boundary; panics that do escape are caught and converted to `Failure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The item is done; its terminal status bit is reported next cycle
    /// and the row deleted.
    Success,
    /// Transient condition; try again after backoff.
    Retry(String),
    /// The handler could not process the item; recorded on the row and
    /// retried after backoff (or dead-lettered past the threshold).
    Failure(String),
}

/// Handles one claimed work item: delivers an outbox message to the
/// transport, or dispatches an inbox message to application code.
///
/// Handlers must be idempotent: a lease can expire mid-handler and the
/// item will be re-run elsewhere.
pub trait WorkHandler: Send + Sync {
    fn handle(&self, work: &ClaimedWork) -> HandlerOutcome;
}

impl<F> WorkHandler for F
where
    F: Fn(&ClaimedWork) -> HandlerOutcome + Send + Sync,
{
    fn handle(&self, work: &ClaimedWork) -> HandlerOutcome {
        self(work)
    }
}

/// One item's outcome, addressed well enough to feed the next
/// coordination call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeReport {
    pub source: WorkSource,
    pub message_id: String,
    pub stream_id: String,
    pub outcome: HandlerOutcome,
}

impl OutcomeReport {
    pub fn new(work: &ClaimedWork, outcome: HandlerOutcome) -> Self {
        OutcomeReport {
            source: work.source,
            message_id: work.message_id.clone(),
            stream_id: work.stream_id.clone(),
            outcome,
        }
    }
}
