//! # Task lifecycle callbacks.
//!
//! [`Callbacks`] is the hook record installed on the engine before
//! `start()`: an optional pre-execution hook, post-execution hook, and
//! panic hook. The engine freezes the record at start (it lives in a
//! `OnceLock`), so reassignment after start is impossible by construction
//! rather than a documented data race.
//!
//! Hooks run synchronously inside the executor slot. A panic raised by a
//! hook is caught by the same guard that isolates handler panics; the
//! panic hook itself must not panic.

use std::any::Any;
use std::sync::Arc;

use crate::tasks::Task;

/// Hook invoked with the task before or after execution.
pub type TaskCallback = Arc<dyn Fn(&Task) + Send + Sync>;

/// Hook invoked with the task and the captured panic payload.
///
/// The payload is whatever the handler panicked with; downcast to `&str`
/// or `String` for the common cases.
pub type TaskPanicCallback = Arc<dyn Fn(&Task, &(dyn Any + Send)) + Send + Sync>;

/// Optional task lifecycle hooks, frozen at engine start.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Runs before each handler invocation.
    pub(crate) before: Option<TaskCallback>,
    /// Runs after the ack decision completes. Skipped when the ack call
    /// itself fails.
    pub(crate) after: Option<TaskCallback>,
    /// Runs instead of the default log line when a handler panics.
    pub(crate) panic: Option<TaskPanicCallback>,
    /// Reserved. Held for a future failed-task hook; never invoked.
    #[allow(dead_code)]
    pub(crate) error: Option<TaskCallback>,
}

/// Best-effort rendering of a panic payload for log output.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
