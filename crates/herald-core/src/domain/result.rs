//! Delivery outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Ok,
    Error,
}

/// Final word on a task, written once it reaches a terminal status.
///
/// At most one result is kept per task; a later write replaces the earlier
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub task_id: TaskId,
    pub outcome: DeliveryOutcome,
    pub detail: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn ok(task_id: TaskId, attempts: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id,
            outcome: DeliveryOutcome::Ok,
            detail: "sent".to_string(),
            attempts,
            timestamp,
        }
    }

    pub fn error(
        task_id: TaskId,
        detail: impl Into<String>,
        attempts: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            outcome: DeliveryOutcome::Error,
            detail: detail.into(),
            attempts,
            timestamp,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == DeliveryOutcome::Ok
    }
}
