use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Source of "now" for every lease, heartbeat, and backoff comparison.
///
/// The coordination store owns its clock, so all time comparisons happen on
/// the storage side of the boundary. Callers never pass timestamps in; a
/// caller with a skewed local clock cannot cause false evictions or early
/// lease expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Clock backed by the system time. The default for production stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Cloning shares the underlying instant, so a test can hold one handle
/// while the store holds another.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now += by;
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, to: SystemTime) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("manual clock poisoned")
    }
}
