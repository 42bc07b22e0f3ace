//! Handle operations: `wait`, `release`, `wait_and_release`.

use std::sync::Arc;

use super::error::TaskError;
use super::pool::Pool;
use super::task::TaskCore;

/// A reference to a submitted task.
///
/// Holding a `TaskHandle` keeps the task's bookkeeping alive; this struct's own `Arc<TaskCore>`
/// clone is the caller's share of it. Dropping it, or calling [`TaskHandle::release`] explicitly,
/// gives that reference up. A task with no handle, no parent still holding it as an unresolved
/// child, and no work left to claim is freed the moment the last `Arc<TaskCore>` drops, the
/// ordinary Rust ownership equivalent of a refcount reaching zero.
pub struct TaskHandle {
    pub(crate) core: Arc<TaskCore>,
    pub(crate) pool: Pool,
}

impl TaskHandle {
    /// Number of work units this task was submitted with.
    pub fn total_units(&self) -> usize {
        self.core.total_units()
    }

    /// `true` once every work unit has finished (successfully or not).
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Block until the task is done, draining the pool's ready queue in the meantime so the
    /// calling thread makes progress on other work instead of idling.
    ///
    /// Returns the captured failure, if this task or one of its ancestors failed.
    pub fn wait(&self) -> Result<(), TaskError> {
        self.core.wait(self.pool.inner())
    }

    /// `wait`, then drop this handle.
    pub fn wait_and_release(self) -> Result<(), TaskError> {
        self.wait()
    }

    /// Give up this handle's reference to the task. Equivalent to dropping it; provided
    /// explicitly to name the operation. Any captured failure that nobody ever waited for is
    /// silently discarded.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use crate::pool::{Pool, PoolSize};

    #[test]
    fn wait_on_already_done_task_returns_immediately() {
        let pool = Pool::new(PoolSize::Fixed(1)).unwrap();
        let handle = pool.submit(1, |_| {}, &[], false);
        handle.wait().unwrap();
        assert!(handle.is_done());
        handle.wait().unwrap();
    }
}
