//! Task: one unit of requested notification work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::payload::{Channel, Payload};
use super::state::TaskStatus;

/// A notification task as seen by the queue, workers, and status queries.
///
/// Only the queue mutates a task, and only on behalf of the worker holding
/// its lease. Terminal tasks are never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub payload: Payload,
    pub status: TaskStatus,

    /// Number of deliveries started, including the current one when InFlight.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, payload: Payload, now: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.payload.channel()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InFlight;
        self.attempts += 1;
        self.updated_at = now;
    }

    pub(crate) fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Succeeded;
        self.updated_at = now;
    }

    pub(crate) fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.last_error = Some(error);
        self.updated_at = now;
    }

    /// Back to Pending, keeping the attempt count.
    pub(crate) fn requeue(&mut self, error: String, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.last_error = Some(error);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SmsPayload;
    use ulid::Ulid;

    fn sms_task() -> Task {
        let id = TaskId::from_ulid(Ulid::new());
        Task::new(id, SmsPayload::new("+15550000", "test").into(), Utc::now())
    }

    #[test]
    fn new_task_is_pending_without_attempts() {
        let task = sms_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.channel(), Channel::Sms);
        assert!(task.last_error.is_none());
    }

    #[test]
    fn attempts_survive_requeue() {
        let mut task = sms_task();
        task.start_attempt(Utc::now());
        task.requeue("boom".to_string(), Utc::now());
        task.start_attempt(Utc::now());
        assert_eq!(task.status, TaskStatus::InFlight);
        assert_eq!(task.attempts, 2);
        assert_eq!(task.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn task_roundtrips_through_json() {
        let mut task = sms_task();
        task.start_attempt(Utc::now());
        task.mark_failed("nope".to_string(), Utc::now());
        let s = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&s).unwrap();
        assert_eq!(back, task);
    }
}
