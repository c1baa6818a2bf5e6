//! ResultStore port: outcome records for polling.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DeliveryResult, TaskId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed by task id; recording again for the same task replaces the old
/// result.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn record(&self, result: DeliveryResult) -> Result<(), StoreError>;

    async fn get(&self, task_id: TaskId) -> Result<Option<DeliveryResult>, StoreError>;

    /// Drop the results of purged tasks. Returns how many were held.
    async fn remove(&self, task_ids: &[TaskId]) -> Result<usize, StoreError>;
}
