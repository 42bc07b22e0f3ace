//! The fixed worker set: lifecycle, default-pool singleton, idle parking.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use super::error::{PoolError, TaskError};
use super::handle::TaskHandle;
use super::queue::ReadyQueue;
use super::task::TaskCore;
use super::worker::{self, IdleParkList};

thread_local! {
    /// 0 for non-worker callers; 1..=N for workers, assigned at spawn time.
    static WORKER_ID: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Requested pool size at construction time.
#[derive(Debug, Clone, Copy)]
pub enum PoolSize {
    /// One worker per available hardware thread, as reported by `std::thread::available_parallelism`.
    Auto,
    /// Exactly `n` workers. `0` is legal: the pool then never runs a worker loop, and all
    /// progress happens inside callers of `wait`/`submit_and_wait`.
    Fixed(usize),
}

impl PoolSize {
    fn resolve(self) -> usize {
        match self {
            PoolSize::Auto => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            PoolSize::Fixed(n) => n,
        }
    }
}

struct Worker {
    id: usize,
    retire: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Shared state behind a [`Pool`] handle; what worker threads and task completion actually hold
/// a reference to.
pub(crate) struct PoolInner {
    pub(crate) ready: ReadyQueue<Arc<TaskCore>>,
    pub(crate) idle: IdleParkList,
    shutdown: AtomicBool,
    size: AtomicUsize,
    next_worker_id: AtomicUsize,
    workers: Mutex<Vec<Worker>>,
}

impl PoolInner {
    fn spawn_worker(self: &Arc<Self>) -> Result<Worker, PoolError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed) + 1;
        let retire = Arc::new(AtomicBool::new(false));
        let pool = self.clone();
        let my_retire = retire.clone();
        let thread = thread::Builder::new()
            .name(format!("barrage-worker-{id}"))
            .spawn(move || {
                WORKER_ID.with(|c| c.set(id));
                worker::run(pool, my_retire);
            })
            .map_err(PoolError::Spawn)?;
        Ok(Worker { id, retire, thread })
    }
}

/// A fixed-size worker pool executing submitted tasks.
///
/// Cloning a `Pool` is cheap and shares the same workers and queue; the last clone to drop joins
/// any workers that are still running.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a new pool with `size` workers. Fails only if the OS refuses to spawn a thread,
    /// in which case any workers already spawned for this call are torn down again.
    pub fn new(size: PoolSize) -> Result<Pool, PoolError> {
        let n = size.resolve();
        let inner = Arc::new(PoolInner {
            ready: ReadyQueue::new(),
            idle: IdleParkList::new(),
            shutdown: AtomicBool::new(false),
            size: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        });

        let mut workers = Vec::with_capacity(n);
        for _ in 0..n {
            match inner.spawn_worker() {
                Ok(w) => workers.push(w),
                Err(e) => {
                    inner.shutdown.store(true, Ordering::SeqCst);
                    inner.idle.unpark_all();
                    for w in workers {
                        w.retire.store(true, Ordering::SeqCst);
                        let _ = w.thread.join();
                    }
                    return Err(e);
                }
            }
        }
        inner.size.store(n, Ordering::SeqCst);
        *inner.workers.lock().unwrap() = workers;
        Ok(Pool { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<PoolInner> {
        &self.inner
    }

    /// Number of live workers.
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::Relaxed)
    }

    /// Resize the pool to exactly `n` workers. Growing spawns new workers immediately; shrinking
    /// marks the excess workers for retirement, wakes them, and joins them, so in-flight tasks
    /// on the remaining workers are never disturbed.
    pub fn set_size(&self, n: usize) -> Result<(), PoolError> {
        let mut workers = self.inner.workers.lock().unwrap();
        let current = workers.len();
        if n > current {
            for _ in current..n {
                workers.push(self.inner.spawn_worker()?);
            }
        } else if n < current {
            let retiring: Vec<Worker> = workers.split_off(n);
            for w in &retiring {
                w.retire.store(true, Ordering::SeqCst);
            }
            self.inner.idle.unpark_all();
            for w in retiring {
                let _ = w.thread.join();
            }
        }
        self.inner.size.store(workers.len(), Ordering::SeqCst);
        Ok(())
    }

    /// Shut every worker down and join them. Idempotent: calling it again on an already-empty
    /// pool is a no-op.
    pub fn destroy(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.idle.unpark_all();
        let mut workers = self.inner.workers.lock().unwrap();
        for w in workers.drain(..) {
            let _ = w.thread.join();
        }
        self.inner.size.store(0, Ordering::SeqCst);
    }

    pub(crate) fn shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Submit a task with `units` independent work units, to run after every task in `parents`
    /// has completed.
    ///
    /// `callback` is invoked once per unit index in `0..units`, in no particular order and
    /// possibly concurrently across workers. If any parent already failed, this task is marked
    /// failed and never runs at all. Otherwise, once every parent is satisfied: if `force_async`
    /// is `false` and `units == 1`, the callback runs synchronously on the calling thread before
    /// this method returns (the "inline fast path"); otherwise the task is handed to the ready
    /// queue for workers (or a waiting caller) to pick up.
    pub fn submit<F>(
        &self,
        units: usize,
        callback: F,
        parents: &[&TaskHandle],
        force_async: bool,
    ) -> TaskHandle
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let task = TaskCore::new(units, parents.len(), callback);
        for parent in parents {
            if task.register_parent(&parent.core) {
                task.dismiss_resolved_parent();
            }
        }

        if !task.has_unresolved_parents() {
            if task.exception().is_some() {
                task.fast_forward_to_done(&self.inner);
            } else if !force_async && units == 1 {
                task.run_inline(&self.inner);
            } else {
                self.inner.ready.push(task.clone());
                self.inner.idle.unpark_all();
            }
        }

        TaskHandle {
            core: task,
            pool: self.clone(),
        }
    }

    /// Submit a single-unit task with no dependencies and block until it completes.
    pub fn submit_and_wait<F>(&self, units: usize, callback: F) -> Result<(), TaskError>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.submit(units, callback, &[], false).wait()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Only the last handle (refcount about to hit zero) should actually tear anything down;
        // cheap to check, and harmless to skip when other clones are still live.
        if Arc::strong_count(&self.inner) == 1 {
            self.destroy();
        }
    }
}

/// `0` for the calling thread when it is not a pool worker; `1..=N` when it is.
pub fn thread_id() -> usize {
    WORKER_ID.with(|c| c.get())
}

static DEFAULT_POOL: OnceLock<Pool> = OnceLock::new();

/// The process-wide default pool, lazily created on first use with [`PoolSize::Auto`].
///
/// Unlike an explicitly constructed [`Pool`], the default pool's worker threads are never
/// joined: like other global thread pools in the Rust ecosystem (e.g. `rayon`'s global pool), it
/// is simply left running until the process exits, since `'static` values are not dropped at
/// program exit and there is no safe, portable hook to join non-daemon threads before `main`
/// returns. See DESIGN.md for the reasoning.
pub fn default_pool() -> &'static Pool {
    DEFAULT_POOL.get_or_init(|| Pool::new(PoolSize::Auto).expect("failed to start default pool"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_pool_is_legal() {
        let pool = Pool::new(PoolSize::Fixed(0)).unwrap();
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn resize_grows_and_shrinks() {
        let pool = Pool::new(PoolSize::Fixed(1)).unwrap();
        pool.set_size(4).unwrap();
        assert_eq!(pool.size(), 4);
        pool.set_size(2).unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn thread_id_is_zero_outside_pool() {
        assert_eq!(thread_id(), 0);
    }
}
