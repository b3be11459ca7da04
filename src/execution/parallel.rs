use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread;

use crate::coordination::{ClaimedWork, WorkBatch};

use super::outcome::{HandlerOutcome, OutcomeReport, WorkHandler};
use super::ExecutionStrategy;

/// Cross-stream parallel execution.
///
/// The batch is split into per-stream runs; runs execute concurrently on a
/// bounded set of scoped threads while items within a run stay strictly
/// sequential. Cross-stream order is unguaranteed by design — that freedom
/// is exactly what the per-stream claim guard buys.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecution {
    max_width: usize,
}

impl ParallelExecution {
    pub fn new() -> Self {
        ParallelExecution { max_width: 8 }
    }

    /// Bound the number of worker threads used per dispatch.
    pub fn with_max_width(mut self, width: usize) -> Self {
        self.max_width = width.max(1);
        self
    }
}

impl Default for ParallelExecution {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStrategy for ParallelExecution {
    fn dispatch(&self, batch: &WorkBatch, handler: &dyn WorkHandler) -> Vec<OutcomeReport> {
        let groups = batch.by_stream();
        if groups.is_empty() {
            return Vec::new();
        }

        let width = self.max_width.min(groups.len());
        // Round-robin streams across workers; each worker runs its streams'
        // items in order.
        let mut buckets: Vec<Vec<&[&ClaimedWork]>> = vec![Vec::new(); width];
        for (i, (_, run)) in groups.iter().enumerate() {
            buckets[i % width].push(run.as_slice());
        }

        let reports = Mutex::new(Vec::with_capacity(batch.len()));
        let reports_ref = &reports;
        thread::scope(|scope| {
            for bucket in &buckets {
                scope.spawn(move || {
                    let mut local = Vec::new();
                    for run in bucket {
                        for work in run.iter() {
                            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(work)))
                                .unwrap_or_else(|_| {
                                    HandlerOutcome::Failure("handler panicked".to_string())
                                });
                            local.push(OutcomeReport::new(work, outcome));
                        }
                    }
                    reports_ref
                        .lock()
                        .expect("parallel execution reports poisoned")
                        .extend(local);
                });
            }
        });

        reports
            .into_inner()
            .expect("parallel execution reports poisoned")
    }
}
