//! Work item lifecycle flags and retry scheduling.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::work_item::WorkSource;

/// Bit-flag lifecycle status of a work item.
///
/// Completions OR bits in rather than overwriting, so independent outcomes
/// (say, published and checkpointed) compose without clobbering each other
/// and re-applying a completion is a no-op.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkStatus(u32);

impl WorkStatus {
    pub const EMPTY: WorkStatus = WorkStatus(0);
    /// Durably persisted.
    pub const STORED: WorkStatus = WorkStatus(1);
    /// Delivered to the transport. Terminal for outbox rows.
    pub const PUBLISHED: WorkStatus = WorkStatus(1 << 1);
    /// Appended to the event store. Terminal for inbox rows.
    pub const EVENT_STORED: WorkStatus = WorkStatus(1 << 2);
    /// Receptor handler ran. Terminal for receptor tracking rows.
    pub const RECEPTOR_PROCESSED: WorkStatus = WorkStatus(1 << 3);
    /// Perspective checkpoint advanced. Terminal for checkpoint rows.
    pub const CHECKPOINTED: WorkStatus = WorkStatus(1 << 4);
    /// At least one attempt failed; row is awaiting its backoff.
    pub const FAILED: WorkStatus = WorkStatus(1 << 5);
    /// Retries exhausted. Row is kept but never claimed again.
    pub const DEAD_LETTERED: WorkStatus = WorkStatus(1 << 6);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> WorkStatus {
        WorkStatus(bits)
    }

    pub const fn contains(self, other: WorkStatus) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two statuses.
    #[must_use]
    pub const fn merge(self, other: WorkStatus) -> WorkStatus {
        WorkStatus(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: WorkStatus) -> WorkStatus {
        WorkStatus(self.0 & !other.0)
    }

    /// The bit that retires a row of the given source for good.
    pub const fn terminal_for(source: WorkSource) -> WorkStatus {
        match source {
            WorkSource::Outbox => WorkStatus::PUBLISHED,
            WorkSource::Inbox => WorkStatus::EVENT_STORED,
            WorkSource::Receptor => WorkStatus::RECEPTOR_PROCESSED,
            WorkSource::Checkpoint => WorkStatus::CHECKPOINTED,
        }
    }

    /// Whether this status retires a row of the given source.
    pub const fn is_terminal_for(self, source: WorkSource) -> bool {
        self.contains(WorkStatus::terminal_for(source))
    }
}

impl fmt::Debug for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(WorkStatus, &str); 7] = [
            (WorkStatus::STORED, "Stored"),
            (WorkStatus::PUBLISHED, "Published"),
            (WorkStatus::EVENT_STORED, "EventStored"),
            (WorkStatus::RECEPTOR_PROCESSED, "ReceptorProcessed"),
            (WorkStatus::CHECKPOINTED, "Checkpointed"),
            (WorkStatus::FAILED, "Failed"),
            (WorkStatus::DEAD_LETTERED, "DeadLettered"),
        ];

        if self.0 == 0 {
            return write!(f, "Empty");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Longest delay a failing row can be pushed out by a single backoff step.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Delay before the next attempt: `base * 2^attempts`, saturating, capped
/// at [`MAX_BACKOFF`].
pub fn next_attempt_delay(base: Duration, attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}
