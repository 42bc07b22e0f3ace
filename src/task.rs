//! The task object: state, refcounts, work-unit counter, parent/child
//! links, callback, and exception slot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use super::error::{CapturedError, TaskError};
use super::pool::PoolInner;

/// `state` is tracked only for diagnostics; the actual transitions are driven entirely by the
/// atomic counters, not by this field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    Pending = 0,
    Ready = 1,
    Running = 2,
    Done = 3,
}

/// A task's children list, held under a short-lived per-task lock. The transition to `Done`
/// and the list drain happen under one lock acquisition, so a child only ever observes one of
/// the two branches below, never a half-updated list.
enum Children {
    Open(Vec<Arc<TaskCore>>),
    Done,
}

/// The callback slot. A reference-counted trait object behind a mutex, so a worker can check it
/// out with a cheap refcount bump and invoke it without holding the lock, and so it can be
/// dropped at completion time instead of waiting for the last handle to release.
type Callback = Arc<dyn Fn(usize) + Send + Sync + 'static>;

pub(crate) struct TaskCore {
    total_units: usize,
    next_unit: AtomicUsize,
    remaining_units: AtomicUsize,
    unresolved_parents: AtomicUsize,
    children: Mutex<Children>,
    callback: Mutex<Option<Callback>>,
    exception_slot: OnceLock<CapturedError>,
    state: AtomicU8,
    fast_forward_claimed: AtomicBool,
    done: Mutex<bool>,
    done_cond: Condvar,
}

impl TaskCore {
    pub(crate) fn new<F>(total_units: usize, unresolved_parents: usize, callback: F) -> Arc<Self>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        assert!(total_units >= 1, "a task must declare at least one work unit");
        Arc::new(Self {
            total_units,
            next_unit: AtomicUsize::new(0),
            remaining_units: AtomicUsize::new(total_units),
            unresolved_parents: AtomicUsize::new(unresolved_parents),
            children: Mutex::new(Children::Open(Vec::new())),
            callback: Mutex::new(Some(Arc::new(callback) as Callback)),
            exception_slot: OnceLock::new(),
            state: AtomicU8::new(TaskState::Pending as u8),
            fast_forward_claimed: AtomicBool::new(false),
            done: Mutex::new(false),
            done_cond: Condvar::new(),
        })
    }

    pub(crate) fn total_units(&self) -> usize {
        self.total_units
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.done.lock().unwrap()
    }

    pub(crate) fn exception(&self) -> Option<CapturedError> {
        self.exception_slot.get().cloned()
    }

    /// Wait-free: a single `fetch_add`. Returns `None` once every index has been handed out.
    pub(crate) fn claim_unit(&self) -> Option<usize> {
        let i = self.next_unit.fetch_add(1, Ordering::AcqRel);
        if i < self.total_units {
            self.state
                .compare_exchange(
                    TaskState::Ready as u8,
                    TaskState::Running as u8,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .ok();
            Some(i)
        } else {
            None
        }
    }

    /// First-wins: only the first captured payload for this task is kept.
    pub(crate) fn capture_exception(&self, payload: Box<dyn std::any::Any + Send + 'static>) {
        let _ = self.exception_slot.set(CapturedError::capture(payload));
    }

    /// Run the callback for `unit`, under `catch_unwind`. A unit that was successfully claimed
    /// always runs to completion even if a sibling unit or a parent has already poisoned the
    /// task's exception slot. Only the claiming of further units is skipped, by
    /// `fast_forward_to_done` before `claim_unit` is reached at all, never the running of a unit
    /// already handed to a worker.
    fn run_unit(&self, unit: usize) {
        let Some(callback) = self.callback.lock().unwrap().clone() else {
            return;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(unit)));
        if let Err(payload) = result {
            self.capture_exception(payload);
        }
    }

    /// Claim and run exactly one unit on behalf of `task`, re-pushing `task` onto `pool`'s ready
    /// queue first if the claim succeeded, so other idle workers can pick up the next index
    /// concurrently while this one runs. Returns `false` if there was nothing left to claim.
    pub(crate) fn claim_and_run(self: &Arc<Self>, pool: &PoolInner) -> bool {
        let Some(unit) = self.claim_unit() else {
            return false;
        };
        pool.ready.push(self.clone());
        pool.idle.unpark_all();
        self.run_unit(unit);
        if self.remaining_units.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.complete(pool);
        }
        true
    }

    /// Mark every unit as abandoned without invoking them, used when a task is failed from a
    /// parent before it ever runs. A task with several parents can have more than one of them
    /// fail and race to fast-forward the same child; only the first claimant actually runs the
    /// completion cascade, the rest are no-ops.
    fn fast_forward_to_done(self: &Arc<Self>, pool: &PoolInner) {
        if self.fast_forward_claimed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug_assert_eq!(
            self.next_unit.load(Ordering::Acquire),
            0,
            "a task can only be fast-forwarded before it has ever been claimed from"
        );
        self.next_unit.store(self.total_units, Ordering::Release);
        self.remaining_units.store(0, Ordering::Release);
        self.complete(pool);
    }

    /// Register `self` as depending on `parent`, during initial submission wiring.
    ///
    /// If `parent` is still open, `self` is appended to its children list and will be resolved
    /// later, during `parent`'s own completion cascade, via the ordinary `release_parent_edge`/
    /// `capture_exception_from_parent` path. If `parent` has already completed, its contribution
    /// is resolved immediately: a captured failure is adopted (first-wins) and `true` is returned
    /// so the submitting thread can account for it. The submitting thread, not this function,
    /// decides whether the task becomes ready, since submission may still be wiring up other
    /// parents or taking the inline fast path.
    pub(crate) fn register_parent(self: &Arc<Self>, parent: &Arc<TaskCore>) -> bool {
        let mut guard = parent.children.lock().unwrap();
        match &mut *guard {
            Children::Open(list) => {
                list.push(self.clone());
                false
            }
            Children::Done => {
                drop(guard);
                if let Some(err) = parent.exception() {
                    let _ = self.exception_slot.set(err);
                }
                true
            }
        }
    }

    /// Decrement `unresolved_parents` for an already-done parent discovered during submission
    /// wiring, without checking for readiness. The submitting thread makes that call itself once
    /// every parent has been accounted for.
    pub(crate) fn dismiss_resolved_parent(&self) {
        self.unresolved_parents.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn has_unresolved_parents(&self) -> bool {
        self.unresolved_parents.load(Ordering::Acquire) != 0
    }

    /// A parent this task depends on has completed (successfully); decrement our unresolved
    /// count and, if that was the last one, become ready.
    fn release_parent_edge(child: Arc<TaskCore>, pool: &PoolInner) {
        if child.unresolved_parents.fetch_sub(1, Ordering::AcqRel) == 1 {
            child.become_ready(pool);
        }
    }

    /// A parent this task depends on has failed; inherit its error and complete immediately
    /// without ever running, regardless of any other still-unresolved parents.
    fn capture_exception_from_parent(self: &Arc<Self>, err: CapturedError, pool: &PoolInner) {
        let _ = self.exception_slot.set(err);
        self.fast_forward_to_done(pool);
    }

    /// Called once `unresolved_parents` has reached zero. If a sibling parent already poisoned
    /// this task (multi-parent task, one parent failed before the others resolved), skip the
    /// queue entirely and fail fast instead of running a doomed task's callback.
    fn become_ready(self: &Arc<Self>, pool: &PoolInner) {
        self.state
            .compare_exchange(
                TaskState::Pending as u8,
                TaskState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .ok();
        if self.exception_slot.get().is_some() {
            self.fast_forward_to_done(pool);
        } else {
            pool.ready.push(self.clone());
            pool.idle.unpark_all();
        }
    }

    /// Run the inline fast path: a single-unit, dependency-free, non-`force_async` task executes
    /// its callback on the submitting thread and completes without ever touching the queue.
    pub(crate) fn run_inline(self: &Arc<Self>, pool: &PoolInner) {
        debug_assert_eq!(self.total_units, 1);
        self.next_unit.store(1, Ordering::Release);
        self.run_unit(0);
        self.remaining_units.store(0, Ordering::Release);
        self.complete(pool);
    }

    /// Executed by the thread that drove `remaining_units` to zero.
    fn complete(self: &Arc<Self>, pool: &PoolInner) {
        let children = {
            let mut guard = self.children.lock().unwrap();
            match std::mem::replace(&mut *guard, Children::Done) {
                Children::Open(list) => list,
                Children::Done => unreachable!("remaining_units reached zero twice for one task"),
            }
        };
        self.state.store(TaskState::Done as u8, Ordering::Release);

        let failure = self.exception();
        for child in children {
            match &failure {
                Some(err) => child.capture_exception_from_parent(err.clone(), pool),
                None => Self::release_parent_edge(child, pool),
            }
        }

        // Drop the callback (and whatever payload it captured) now, not when the last handle
        // releases.
        self.callback.lock().unwrap().take();

        *self.done.lock().unwrap() = true;
        self.done_cond.notify_all();
    }

    /// Block until this task is `Done`, driving `pool`'s ready queue in the meantime so the
    /// waiting thread makes progress on other tasks instead of idling.
    pub(crate) fn wait(self: &Arc<Self>, pool: &PoolInner) -> Result<(), TaskError> {
        loop {
            if self.is_done() {
                break;
            }
            match pool.ready.pop() {
                Some(task) => {
                    task.claim_and_run(pool);
                }
                None => {
                    let guard = self.done.lock().unwrap();
                    if *guard {
                        break;
                    }
                    let (_guard, _timeout) = self
                        .done_cond
                        .wait_timeout(guard, std::time::Duration::from_millis(50))
                        .unwrap();
                }
            }
        }
        match self.exception() {
            Some(err) => Err(TaskError::Failed(err)),
            None => Ok(()),
        }
    }
}
