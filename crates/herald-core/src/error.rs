use thiserror::Error;

use crate::domain::{TaskId, ValidationError};
use crate::ports::{QueueError, StoreError};

/// Errors a caller of the dispatcher can see.
///
/// Delivery failures are not in here: they end up in `DeliveryResult`.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} did not finish in time")]
    WaitTimedOut(TaskId),
}
