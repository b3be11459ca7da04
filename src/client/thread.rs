//! Background coordination loop.
//!
//! Runs a [`Coordinator`] on a fixed cadence in its own thread: tick,
//! sleep, repeat, until stopped. Whole-cycle storage errors are counted
//! and retried on the next tick, never fatal.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use crate::coordination::CoordinationStore;

use super::coordinator::Coordinator;

/// Statistics from the coordination loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: usize,
    pub skipped: usize,
    pub errors: usize,
    pub stored: usize,
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A background thread driving the coordination loop.
///
/// ## Example
///
/// ```ignore
/// use relayed_rust::{Coordinator, CoordinatorThread, InMemoryCoordinationStore, ServiceInstance};
/// use std::time::Duration;
///
/// let coordinator = Coordinator::new(store, instance, handler);
/// let worker = CoordinatorThread::spawn(coordinator, Duration::from_millis(50));
///
/// // ... produce work through other instances ...
///
/// let stats = worker.stop();
/// println!("claimed {} items", stats.claimed);
/// ```
pub struct CoordinatorThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<LoopStats>>,
}

impl CoordinatorThread {
    /// Spawn the loop. The coordinator is moved into the thread; stopping
    /// performs the final shutdown call before returning the stats.
    pub fn spawn<S>(mut coordinator: Coordinator<S>, poll_interval: Duration) -> Self
    where
        S: CoordinationStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = LoopStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.ticks += 1;
                match coordinator.tick() {
                    Ok(outcome) => {
                        if outcome.skipped {
                            stats.skipped += 1;
                        }
                        stats.stored += outcome.stored;
                        stats.claimed += outcome.claimed;
                        stats.succeeded += outcome.succeeded;
                        stats.failed += outcome.failed;
                    }
                    Err(e) => {
                        // Transient by assumption; the next tick retries
                        // with everything still buffered.
                        stats.errors += 1;
                        warn!(error = %e, "coordination tick failed");
                    }
                }

                thread::sleep(poll_interval);
            }

            if let Err(e) = coordinator.shutdown() {
                stats.errors += 1;
                warn!(error = %e, "final shutdown call failed");
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for the final shutdown call.
    /// Returns the loop statistics.
    pub fn stop(mut self) -> LoopStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            LoopStats::default()
        }
    }

    /// Signal the loop to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for CoordinatorThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        // Don't join on drop - let the thread finish naturally
    }
}
