//! Queue-side bookkeeping around a task.

use tokio::time::Instant;

use crate::domain::Task;
use crate::ports::LeaseToken;

/// Current holder of an InFlight task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LeaseSlot {
    pub token: LeaseToken,
    pub expires_at: Instant,
}

/// Task plus the runtime-only state the queue needs to schedule it.
///
/// `task` is what gets journaled; `lease` and `visible_at` are rebuilt on
/// replay (leases do not survive a restart, pending backoff is dropped).
#[derive(Debug, Clone)]
pub(crate) struct TaskRecord {
    pub task: Task,
    pub lease: Option<LeaseSlot>,

    /// Set while a retried task waits out its backoff.
    pub visible_at: Option<Instant>,
}

impl TaskRecord {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            lease: None,
            visible_at: None,
        }
    }

    pub fn holds(&self, token: LeaseToken) -> bool {
        self.lease.is_some_and(|slot| slot.token == token)
    }

    pub fn lease_expired(&self, now: Instant) -> bool {
        self.lease.is_some_and(|slot| slot.expires_at <= now)
    }
}
