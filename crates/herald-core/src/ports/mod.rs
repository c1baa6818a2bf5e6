//! Ports: the seams between the delivery core and its collaborators.
//!
//! - `TaskQueue`: in-memory or journal-backed broker (`queue` module)
//! - `ResultStore`: outcome records (`impls` module)
//! - `DeliveryChannel`: email/SMS providers (`channels` module)
//! - `Clock`, `IdGenerator`: swappable for deterministic tests

pub mod channel;
pub mod clock;
pub mod id_generator;
pub mod result_store;
pub mod task_queue;

pub use self::channel::{ChannelPayload, DeliveryChannel, DynChannel};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::result_store::{ResultStore, StoreError};
pub use self::task_queue::{
    Lease, LeaseToken, QueueCounts, QueueError, ReapReport, TaskQueue,
};
