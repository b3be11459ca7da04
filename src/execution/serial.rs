use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::coordination::WorkBatch;

use super::outcome::{HandlerOutcome, OutcomeReport, WorkHandler};
use super::ExecutionStrategy;

/// Strict FIFO execution: items run one at a time in batch order, which is
/// `(stream, created)` order. The simplest strategy and the only one that
/// also serializes across streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialExecution;

impl SerialExecution {
    pub fn new() -> Self {
        SerialExecution
    }
}

impl ExecutionStrategy for SerialExecution {
    fn dispatch(&self, batch: &WorkBatch, handler: &dyn WorkHandler) -> Vec<OutcomeReport> {
        let mut reports = Vec::with_capacity(batch.len());
        for work in batch.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(work)))
                .unwrap_or_else(|_| HandlerOutcome::Failure("handler panicked".to_string()));
            reports.push(OutcomeReport::new(work, outcome));
        }
        reports
    }
}
