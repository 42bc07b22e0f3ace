//! The lock-free, multi-producer/multi-consumer ready queue.
//!
//! `crossbeam_deque::Injector` is itself a Michael-Scott-style segmented
//! linked list with lock-free push and a helping `steal` operation: non-
//! blocking push from any thread, non-blocking pop that hands distinct tasks
//! to distinct callers under contention, and FIFO order between pushes. This
//! module just wraps it with the `push`/`pop` names the scheduler expects.

extern crate crossbeam_deque;

use crossbeam_deque::{Injector, Steal};

/// Ready queue of tasks awaiting a worker. `T` is `Arc<TaskCore>` in practice.
pub(crate) struct ReadyQueue<T> {
    injector: Injector<T>,
}

impl<T> ReadyQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            injector: Injector::new(),
        }
    }

    /// Push a task onto the back of the queue. Non-blocking, safe from any thread.
    pub(crate) fn push(&self, item: T) {
        self.injector.push(item);
    }

    /// Pop the task at the front of the queue, if any. Non-blocking.
    ///
    /// A `Steal::Retry` (another consumer is mid-pop on the same segment) is not an absence of
    /// work, so we spin on it rather than reporting `None` for a queue that is merely contended.
    pub(crate) fn pop(&self) -> Option<T> {
        loop {
            match self.injector.steal() {
                Steal::Success(item) => return Some(item),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.injector.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_single_thread() {
        let q = ReadyQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q: ReadyQueue<i32> = ReadyQueue::new();
        assert!(q.is_empty());
        q.push(7);
        assert!(!q.is_empty());
        assert_eq!(q.pop(), Some(7));
        assert!(q.is_empty());
    }

    #[test]
    fn distinct_tasks_to_distinct_threads() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(ReadyQueue::new());
        for i in 0..2000 {
            q.push(i);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = q.clone();
                thread::spawn(move || {
                    let mut popped = Vec::new();
                    while let Some(i) = q.pop() {
                        popped.push(i);
                    }
                    popped
                })
            })
            .collect();

        let mut all: Vec<i32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        let expected: Vec<i32> = (0..2000).collect();
        assert_eq!(all, expected);
    }
}
