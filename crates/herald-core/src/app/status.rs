//! TaskReport: a task joined with its recorded outcome, for display.

use serde::{Deserialize, Serialize};

use crate::domain::{DeliveryResult, Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: Task,
    /// `None` until the task reaches a terminal status.
    pub result: Option<DeliveryResult>,
}

impl TaskReport {
    pub fn new(task: Task, result: Option<DeliveryResult>) -> Self {
        Self { task, result }
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status
    }

    pub fn delivered(&self) -> bool {
        self.result.as_ref().is_some_and(DeliveryResult::is_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SmsPayload, TaskId};
    use chrono::Utc;
    use ulid::Ulid;

    #[test]
    fn report_serializes_task_and_result_side_by_side() {
        let task = Task::new(
            TaskId::from_ulid(Ulid::new()),
            SmsPayload::new("+15550000", "hi").into(),
            Utc::now(),
        );
        let report = TaskReport::new(task.clone(), None);
        assert!(!report.delivered());
        assert_eq!(report.status(), TaskStatus::Pending);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["task"]["status"], "pending");
        assert!(json["result"].is_null());

        let done = TaskReport::new(task.clone(), Some(DeliveryResult::ok(task.id, 1, Utc::now())));
        assert!(done.delivered());
    }
}
