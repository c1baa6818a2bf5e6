//! Application layer: ports composed into a running dispatcher.
//!
//! - **AppBuilder**: wiring and startup checks
//! - **Dispatcher**: submit, query, cancel
//! - **WorkerPool**: dequeue -> send -> ack/nack loops
//! - **ReaperLoop**: returns expired leases to the queue
//! - **GcLoop**: purges finished tasks past retention

pub mod builder;
pub mod dispatcher;
pub mod gc_loop;
pub mod reaper_loop;
pub mod status;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::dispatcher::Dispatcher;
pub use self::gc_loop::GcLoop;
pub use self::reaper_loop::ReaperLoop;
pub use self::status::TaskReport;
pub use self::worker_pool::{PoolOptions, WorkerPool};
