use std::sync::Arc;

use tracing::{debug, warn};

use crate::coordination::{
    Completion, CoordinationRequest, CoordinationSettings, CoordinationStore, Failure,
};
use crate::error::CoordinationError;
use crate::execution::{
    ExecutionStrategy, HandlerOutcome, OutcomeReport, SerialExecution, WorkHandler,
};
use crate::instance::ServiceInstance;
use crate::status::WorkStatus;
use crate::stream_key::StreamKeyRegistry;
use crate::work_item::{NewWorkMessage, WorkSource};

/// What one coordination cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// The readiness predicate said no; nothing was sent, everything is
    /// still buffered.
    pub skipped: bool,
    /// Rows persisted by this cycle.
    pub stored: usize,
    /// Rows claimed (inserted or reclaimed) and dispatched.
    pub claimed: usize,
    /// Items whose handler reported success.
    pub succeeded: usize,
    /// Items whose handler reported retry or failure.
    pub failed: usize,
    /// Active-instance count the store observed.
    pub active_instances: usize,
}

/// Client side of the coordination engine.
///
/// Owns the in-memory buffer of not-yet-durable messages and the outcome
/// reports of the previous cycle. Each `tick` folds all of it into one
/// coordination call, then feeds the returned batch to the execution
/// strategy in stream order. When storage is unreachable the tick is
/// skipped and everything stays buffered — availability over immediate
/// persistence.
pub struct Coordinator<S> {
    store: S,
    instance: ServiceInstance,
    settings: CoordinationSettings,
    strategy: Box<dyn ExecutionStrategy>,
    handler: Arc<dyn WorkHandler>,
    readiness: Box<dyn Fn() -> bool + Send>,
    stream_keys: Option<StreamKeyRegistry>,
    pending_outbox: Vec<NewWorkMessage>,
    pending_inbox: Vec<NewWorkMessage>,
    pending_completions: Vec<Completion>,
    pending_failures: Vec<Failure>,
    accepting: bool,
}

impl<S: CoordinationStore> Coordinator<S> {
    pub fn new(store: S, instance: ServiceInstance, handler: Arc<dyn WorkHandler>) -> Self {
        Coordinator {
            store,
            instance,
            settings: CoordinationSettings::default(),
            strategy: Box::new(SerialExecution::new()),
            handler,
            readiness: Box::new(|| true),
            stream_keys: None,
            pending_outbox: Vec::new(),
            pending_inbox: Vec::new(),
            pending_completions: Vec::new(),
            pending_failures: Vec::new(),
            accepting: true,
        }
    }

    pub fn with_settings(mut self, settings: CoordinationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_strategy(mut self, strategy: impl ExecutionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Storage reachability check consulted before every cycle.
    pub fn with_readiness(mut self, readiness: impl Fn() -> bool + Send + 'static) -> Self {
        self.readiness = Box::new(readiness);
        self
    }

    /// Attach a validated stream-key registry for [`enqueue_event`].
    ///
    /// [`enqueue_event`]: Coordinator::enqueue_event
    pub fn with_stream_keys(
        mut self,
        registry: StreamKeyRegistry,
    ) -> Result<Self, CoordinationError> {
        registry
            .validate()
            .map_err(|e| CoordinationError::InvalidRequest(e.to_string()))?;
        self.stream_keys = Some(registry);
        Ok(self)
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Messages buffered but not yet persisted.
    pub fn buffered(&self) -> usize {
        self.pending_outbox.len() + self.pending_inbox.len()
    }

    /// Buffer an outbound message for the next cycle.
    pub fn enqueue_outbox(&mut self, message: NewWorkMessage) -> Result<(), CoordinationError> {
        self.ensure_accepting()?;
        self.pending_outbox.push(message);
        Ok(())
    }

    /// Buffer an inbound message for the next cycle.
    pub fn enqueue_inbox(&mut self, message: NewWorkMessage) -> Result<(), CoordinationError> {
        self.ensure_accepting()?;
        self.pending_inbox.push(message);
        Ok(())
    }

    /// Buffer an event-flagged outbound message, resolving its stream id
    /// through the stream-key registry.
    pub fn enqueue_event(
        &mut self,
        message_id: impl Into<String>,
        destination: impl Into<String>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<(), CoordinationError> {
        self.ensure_accepting()?;
        let event_type = event_type.into();
        let registry = self.stream_keys.as_ref().ok_or_else(|| {
            CoordinationError::InvalidRequest("no stream key registry attached".to_string())
        })?;
        let stream_id = registry
            .stream_for(&event_type, &payload)
            .map_err(|e| CoordinationError::InvalidRequest(e.to_string()))?
            .ok_or_else(|| {
                CoordinationError::InvalidRequest(format!(
                    "stream key extractor for {} declined the payload",
                    event_type
                ))
            })?;
        self.pending_outbox.push(
            NewWorkMessage::new(message_id, destination, event_type, payload, stream_id)
                .as_event(),
        );
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<(), CoordinationError> {
        if self.accepting {
            Ok(())
        } else {
            Err(CoordinationError::InvalidRequest(
                "coordinator is shutting down".to_string(),
            ))
        }
    }

    fn build_request(&self, settings: CoordinationSettings) -> CoordinationRequest {
        // Ids with undelivered outcome reports get their leases renewed in
        // the same call that applies the outcomes; the renewal is what
        // keeps them from being stolen when cycles were skipped for a
        // while and the reports arrive late.
        let renew_only: Vec<String> = self
            .pending_completions
            .iter()
            .map(|c| c.message_id.clone())
            .chain(self.pending_failures.iter().map(|f| f.message_id.clone()))
            .collect();

        CoordinationRequest {
            instance: self.instance.clone(),
            settings,
            completions: self.pending_completions.clone(),
            failures: self.pending_failures.clone(),
            new_outbox: self.pending_outbox.clone(),
            new_inbox: self.pending_inbox.clone(),
            renew_only,
        }
    }

    fn absorb_reports(&mut self, reports: Vec<OutcomeReport>, outcome: &mut CycleOutcome) {
        for report in reports {
            match report.outcome {
                HandlerOutcome::Success => {
                    outcome.succeeded += 1;
                    self.pending_completions.push(Completion {
                        source: report.source,
                        message_id: report.message_id,
                        status: WorkStatus::terminal_for(report.source),
                    });
                }
                HandlerOutcome::Retry(reason) | HandlerOutcome::Failure(reason) => {
                    outcome.failed += 1;
                    self.pending_failures.push(Failure {
                        source: report.source,
                        message_id: report.message_id,
                        status: WorkStatus::EMPTY,
                        error: reason,
                    });
                }
            }
        }
    }

    /// Run one coordination cycle.
    ///
    /// Storage errors leave every buffer intact; the caller retries on the
    /// next tick.
    pub fn tick(&mut self) -> Result<CycleOutcome, CoordinationError> {
        if !(self.readiness)() {
            debug!(buffered = self.buffered(), "storage not ready, cycle skipped");
            return Ok(CycleOutcome {
                skipped: true,
                ..CycleOutcome::default()
            });
        }

        let request = self.build_request(self.settings.clone());
        let batch = match self.store.coordinate(&request) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, buffered = self.buffered(), "coordination cycle failed");
                return Err(e);
            }
        };

        // Everything in the request is durable now.
        let stored = self.pending_outbox.len() + self.pending_inbox.len();
        self.pending_outbox.clear();
        self.pending_inbox.clear();
        self.pending_completions.clear();
        self.pending_failures.clear();

        let mut outcome = CycleOutcome {
            skipped: false,
            stored,
            claimed: batch.len(),
            succeeded: 0,
            failed: 0,
            active_instances: batch.active_instances,
        };

        if !batch.is_empty() {
            let reports = self.strategy.dispatch(&batch, self.handler.as_ref());
            self.absorb_reports(reports, &mut outcome);
        }

        Ok(outcome)
    }

    /// Stop accepting new work and issue one final call that applies all
    /// pending outcomes without claiming anything further.
    ///
    /// Anything this instance still leases is left to expire naturally;
    /// rows whose outcomes were reported here are released or retired for
    /// real.
    pub fn shutdown(&mut self) -> Result<CycleOutcome, CoordinationError> {
        self.accepting = false;

        let settings = self.settings.clone().with_batch_size(0);
        let request = self.build_request(settings);
        let batch = self.store.coordinate(&request)?;

        let stored = self.pending_outbox.len() + self.pending_inbox.len();
        self.pending_outbox.clear();
        self.pending_inbox.clear();
        self.pending_completions.clear();
        self.pending_failures.clear();

        // Fresh inserts come back leased to this instance, but nothing is
        // dispatched during shutdown; their leases lapse and another
        // instance claims them.
        Ok(CycleOutcome {
            skipped: false,
            stored,
            claimed: 0,
            succeeded: 0,
            failed: 0,
            active_instances: batch.active_instances,
        })
    }
}
