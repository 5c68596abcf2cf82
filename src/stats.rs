//! # Engine counters.
//!
//! One atomic tally per observable event in the pull/dispatch/execute
//! pipeline. Counters only ever go up; [`Counters::snapshot`] reads them
//! as a group **without** a lock, so the map is not a consistent instant:
//! a counter may tick between two reads. Callers diff snapshots over time
//! (the usual stats-reporter pattern) and that use is unaffected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Atomic tallies shared by every topic worker of an engine.
#[derive(Debug, Default)]
pub struct Counters {
    /// Dequeue attempts.
    pull: AtomicI64,
    /// Dequeue attempts that returned a real error.
    pull_err: AtomicI64,
    /// Dequeue attempts that found nothing.
    pull_empty: AtomicI64,
    /// Messages received from the queue.
    task: AtomicI64,
    /// Messages that failed to decode into a task.
    task_err: AtomicI64,
    /// Handler invocations that returned.
    handle: AtomicI64,
    /// Handler invocations that returned a failed state.
    handle_err: AtomicI64,
    /// Handler invocations that panicked.
    handle_panic: AtomicI64,
}

impl Counters {
    pub(crate) fn inc_pull(&self) {
        self.pull.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_pull_err(&self) {
        self.pull_err.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_pull_empty(&self) {
        self.pull_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_task(&self) {
        self.task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_task_err(&self) {
        self.task_err.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_handle(&self) {
        self.handle.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_handle_err(&self) {
        self.handle_err.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_handle_panic(&self) {
        self.handle_panic.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters into a map with stable keys.
    ///
    /// Keys: `pull`, `pull_err`, `pull_empty`, `task`, `task_err`,
    /// `handle`, `handle_err`, `handle_panic`.
    pub fn snapshot(&self) -> HashMap<&'static str, i64> {
        HashMap::from([
            ("pull", self.pull.load(Ordering::Relaxed)),
            ("pull_err", self.pull_err.load(Ordering::Relaxed)),
            ("pull_empty", self.pull_empty.load(Ordering::Relaxed)),
            ("task", self.task.load(Ordering::Relaxed)),
            ("task_err", self.task_err.load(Ordering::Relaxed)),
            ("handle", self.handle.load(Ordering::Relaxed)),
            ("handle_err", self.handle_err.load(Ordering::Relaxed)),
            ("handle_panic", self.handle_panic.load(Ordering::Relaxed)),
        ])
    }
}
