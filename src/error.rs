//! Error types surfaced by the scheduler.
//!
//! Two kinds are distinguished, matching the two points in the engine where
//! a caller can observe a failure: [`PoolError`] surfaces synchronously at
//! the call that triggered it (pool construction, resizing); [`TaskError`]
//! surfaces only when a caller waits on a task whose work units (or one of
//! its ancestors' work units) failed.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

extern crate thiserror;
use thiserror::Error;

/// Resource failure raised synchronously by pool construction or resizing.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),
}

/// A work-unit failure, or a failure inherited from an unfulfilled parent, surfaced at a waiter.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A work unit of this task (or of an ancestor) panicked; this carries the captured payload.
    #[error("task failed: {0}")]
    Failed(#[source] CapturedError),
}

/// An arbitrary panic payload captured from a work-unit callback, normalized into a value that
/// can be cloned to every waiter and every failure-propagated descendant.
///
/// Work units fail by panicking with any `Send + 'static` payload (`std::panic::panic_any`);
/// the claiming worker catches it via `catch_unwind` and wraps it here. `Box<dyn Any + Send>`
/// itself is not `Clone`, and more than one waiter or descendant may need to observe the same
/// failure, so the payload is kept behind a shared, lock-protected cell instead of being moved
/// out and re-thrown.
#[derive(Clone)]
pub struct CapturedError(Arc<Mutex<Box<dyn Any + Send + 'static>>>);

impl CapturedError {
    pub(crate) fn capture(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self(Arc::new(Mutex::new(payload)))
    }

    /// Best-effort text rendering of the panic payload: the common cases (`&str`, `String`)
    /// used by `panic!`/`panic_any` are rendered verbatim; anything else is reported opaquely.
    fn render(&self) -> String {
        let guard = self.0.lock().unwrap();
        if let Some(s) = guard.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = guard.downcast_ref::<String>() {
            s.clone()
        } else {
            "work unit panicked with a non-string payload".to_string()
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedError").field(&self.render()).finish()
    }
}

impl std::error::Error for CapturedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_string_payloads() {
        let e = CapturedError::capture(Box::new("Hello world!"));
        assert_eq!(e.to_string(), "Hello world!");
    }

    #[test]
    fn renders_owned_string_payloads() {
        let e = CapturedError::capture(Box::new(String::from("boom")));
        assert_eq!(e.to_string(), "boom");
    }

    #[test]
    fn renders_opaque_payloads() {
        let e = CapturedError::capture(Box::new(42i32));
        assert!(e.to_string().contains("non-string"));
    }

    #[test]
    fn clones_share_the_same_payload() {
        let e = CapturedError::capture(Box::new("shared"));
        let cloned = e.clone();
        assert_eq!(e.to_string(), cloned.to_string());
    }
}
