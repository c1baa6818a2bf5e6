//! Bundled port implementations that are not part of the queue.

pub mod inmem_results;

pub use self::inmem_results::InMemoryResultStore;
