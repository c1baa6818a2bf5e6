//! Task status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a task.
///
/// Transitions:
/// - Pending -> InFlight -> Succeeded
/// - Pending -> InFlight -> Failed (attempts exhausted, or no channel can take it)
/// - Pending -> InFlight -> Pending (retry with backoff, or lease expired)
/// - Pending -> Failed (cancelled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue (possibly delayed by backoff).
    Pending,

    /// Leased to exactly one worker.
    InFlight,

    /// Delivered.
    Succeeded,

    /// Gave up; see `Task::last_error`.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Can a worker take this task?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InFlight => write!(f, "in_flight"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}
