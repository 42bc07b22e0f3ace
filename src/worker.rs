//! The worker loop: pop from the ready queue, claim and run one unit, and
//! fall back to a bounded spin/yield/park backoff when the queue looks
//! empty.
//!
//! The idle-park bookkeeping (`IdleParkList`) is a list of parked `Thread`
//! handles that a producer unparks directly, rather than a condvar, since
//! the thing being woken is "go look at the queue again," not a value to
//! hand over.

extern crate crossbeam_utils;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::Duration;

use crossbeam_utils::Backoff;

use super::pool::PoolInner;

/// Threads parked waiting for new work to appear on the ready queue.
pub(crate) struct IdleParkList {
    list: Mutex<Vec<Thread>>,
}

impl IdleParkList {
    pub(crate) fn new() -> Self {
        Self {
            list: Mutex::new(Vec::new()),
        }
    }

    fn push_current(&self) {
        self.list.lock().unwrap().push(thread::current());
    }

    /// Wake every parked worker; used on shutdown and on every successful push so a sleeping
    /// worker does not miss newly-ready work.
    pub(crate) fn unpark_all(&self) {
        for t in self.list.lock().unwrap().drain(..) {
            t.unpark();
        }
    }
}

/// Park the current thread on `idle` for up to `timeout`, bounded so shutdown and new-work
/// signals are never missed for long.
fn park_with_timeout(idle: &IdleParkList, timeout: Duration) {
    idle.push_current();
    thread::park_timeout(timeout);
}

/// A single worker thread's main loop. Runs until `pool` is shut down and the ready queue has
/// gone empty, or until `retire` is set (used for a targeted `Pool::set_size` shrink).
pub(crate) fn run(pool: Arc<PoolInner>, retire: Arc<AtomicBool>) {
    let backoff = Backoff::new();
    loop {
        if retire.load(Ordering::Acquire) {
            return;
        }
        match pool.ready.pop() {
            Some(task) => {
                backoff.reset();
                task.claim_and_run(&pool);
            }
            None => {
                if pool.shutting_down() && pool.ready.is_empty() {
                    return;
                }
                if backoff.is_completed() {
                    park_with_timeout(&pool.idle, Duration::from_millis(50));
                } else {
                    backoff.snooze();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Pool, PoolSize};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn worker_drains_submitted_tasks() {
        let pool = Pool::new(PoolSize::Fixed(2)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let c = count.clone();
                pool.submit(1, move |_| { c.fetch_add(1, Ordering::SeqCst); }, &[], true)
            })
            .collect();
        for h in handles {
            h.wait_and_release().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 20);
    }
}
