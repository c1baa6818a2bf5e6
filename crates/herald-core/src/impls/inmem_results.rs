//! InMemoryResultStore: results kept until their task is purged.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DeliveryResult, TaskId};
use crate::ports::{ResultStore, StoreError};

#[derive(Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<TaskId, DeliveryResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn record(&self, result: DeliveryResult) -> Result<(), StoreError> {
        self.results.write().await.insert(result.task_id, result);
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<DeliveryResult>, StoreError> {
        Ok(self.results.read().await.get(&task_id).cloned())
    }

    async fn remove(&self, task_ids: &[TaskId]) -> Result<usize, StoreError> {
        let mut results = self.results.write().await;
        Ok(task_ids
            .iter()
            .filter(|id| results.remove(*id).is_some())
            .count())
    }
}
