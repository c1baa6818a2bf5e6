//! herald-core
//!
//! Background delivery of email and SMS notifications.
//!
//! - **domain**: payloads, tasks, results, error taxonomy
//! - **ports**: TaskQueue, ResultStore, DeliveryChannel, Clock, IdGenerator
//! - **queue**: in-memory queue with optional journal, retry policy
//! - **channels**: email/SMS channels and the channel registry
//! - **impls**: in-memory ResultStore
//! - **app**: AppBuilder, Dispatcher, WorkerPool, ReaperLoop
//! - **config**: `HERALD_*` settings

pub mod app;
pub mod channels;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{App, AppBuilder, BuildError, Dispatcher, TaskReport, WorkerPool};
pub use config::{Config, ConfigError};
pub use error::HeraldError;
