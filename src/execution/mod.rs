mod outcome;
mod parallel;
mod serial;

pub use outcome::{HandlerOutcome, OutcomeReport, WorkHandler};
pub use parallel::ParallelExecution;
pub use serial::SerialExecution;

use crate::coordination::WorkBatch;

/// How a claimed batch is fed to the handler.
///
/// Strategies never let a per-item error escape: every item produces an
/// [`OutcomeReport`], and those reports become the completion/failure
/// inputs of the next coordination call.
pub trait ExecutionStrategy: Send {
    fn dispatch(&self, batch: &WorkBatch, handler: &dyn WorkHandler) -> Vec<OutcomeReport>;
}
