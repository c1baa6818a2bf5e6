//! Queue module: in-memory broker, its journal, and the retry policy.

mod backend;
mod journal;
mod memory;
mod record;
mod retry;

pub use backend::QueueBackend;
pub use memory::{CANCELLED, InMemoryTaskQueue, QueueOptions};
pub use retry::{RetryDecision, RetryPolicy};
