//! A minimal task-parallel execution engine: a fixed worker pool, a task
//! dependency DAG, and a lock-free ready queue.
//!
//! A [`Pool`] owns a fixed set of worker threads draining a shared ready
//! queue. [`Pool::submit`] hands it a task of one or more work units and,
//! optionally, a list of parent tasks to wait on first; the returned
//! [`TaskHandle`] observes completion or failure. [`parallel_for`] is a
//! convenience adapter over `submit` for partitioning a flat index range.
#![allow(dead_code)]

mod error;
mod handle;
mod parallel_for;
mod pool;
mod queue;
mod task;
mod worker;

pub use error::{CapturedError, PoolError, TaskError};
pub use handle::TaskHandle;
pub use parallel_for::parallel_for;
pub use pool::{default_pool, thread_id, Pool, PoolSize};
