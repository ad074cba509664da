//! Fixed-size worker pool with an all-tasks-drained completion barrier.
//!
//! Every stage that fans out over many payloads, and the plugin manager when it
//! runs independent plugins, goes through this pool.

pub mod worker_pool;

pub use worker_pool::{PoolError, TaskError, WorkerPool};
