//! TaskQueue port: durable, ordered, at-least-once broker of tasks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Task, TaskId, TaskStatus};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} already enqueued")]
    Duplicate(TaskId),

    #[error("task {id} is {status}; only pending tasks can be cancelled")]
    NotCancellable { id: TaskId, status: TaskStatus },

    #[error("lease on task {0} expired or was superseded")]
    LeaseLost(TaskId),

    #[error("queue journal i/o: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("queue journal line {line} is corrupt: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported queue backend url: {0}")]
    UnsupportedBackend(String),
}

/// Identifies one grant of a task to a worker. A task that is reaped and
/// leased again gets a new token, which invalidates the old lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(u64);

impl LeaseToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A task handed to a worker. Consumed by `ack` or `nack`; dropping it
/// without either leaves the task InFlight until the visibility timeout.
#[derive(Debug)]
pub struct Lease {
    task: Task,
    token: LeaseToken,
}

impl Lease {
    pub fn new(task: Task, token: LeaseToken) -> Self {
        Self { task, token }
    }

    /// Snapshot taken at dequeue time (status InFlight, attempts already
    /// counting this delivery).
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn token(&self) -> LeaseToken {
        self.token
    }
}

/// What a visibility sweep did.
#[derive(Debug, Default)]
pub struct ReapReport {
    /// Returned to Pending.
    pub requeued: Vec<TaskId>,
    /// Out of attempts; now Failed.
    pub failed: Vec<Task>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Queue port.
///
/// Tasks leave the queue only through `ack`, `nack(.., None)`, `cancel`, or a
/// reap that finds them out of attempts. A worker that never answers for its
/// lease gets the task taken back by `reap_expired`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist and append a Pending task.
    async fn enqueue(&self, task: Task) -> Result<TaskId, QueueError>;

    /// Oldest visible Pending task, marked InFlight with `attempts + 1`.
    /// Waits while nothing is visible.
    async fn dequeue(&self) -> Result<Lease, QueueError>;

    /// InFlight -> Succeeded.
    async fn ack(&self, lease: Lease) -> Result<Task, QueueError>;

    /// `Some(delay)`: InFlight -> Pending, visible again after `delay`.
    /// `None`: InFlight -> Failed.
    async fn nack(
        &self,
        lease: Lease,
        error: String,
        requeue: Option<Duration>,
    ) -> Result<Task, QueueError>;

    /// Pending -> Failed with `last_error = "cancelled"`.
    async fn cancel(&self, task_id: TaskId) -> Result<Task, QueueError>;

    /// Take back InFlight tasks whose lease expired.
    async fn reap_expired(&self) -> Result<ReapReport, QueueError>;

    /// Forget Succeeded/Failed tasks last updated before `finished_before`.
    /// Returns their ids, sorted.
    async fn purge_terminal(
        &self,
        finished_before: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, QueueError>;

    async fn get(&self, task_id: TaskId) -> Result<Option<Task>, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}
