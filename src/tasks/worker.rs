//! # Worker abstraction for task handlers.
//!
//! Defines the [`Worker`] trait (the caller-supplied handler invoked once
//! per task) and [`WorkerFn`], a function-backed implementation that
//! wraps a closure.
//!
//! ## Rules
//! - The handler receives the task **by value** and hands it back with
//!   [`Task::result`] set; the zero value is `Succeed`, so a handler that
//!   touches nothing acks the message.
//! - The [`CancellationToken`] is the engine's stop signal; long handlers
//!   should check it and wind down promptly.
//! - Handlers must not stash work that mutates the task after return; the
//!   returned envelope is what drives the ack decision.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tasks::task::Task;

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;

/// Handler invoked for every task pulled from a topic.
///
/// Implementations run inside a bounded executor pool; up to `size`
/// invocations of the same worker run concurrently, so `exec` takes
/// `&self` and must not rely on exclusive state.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use topiq::{Task, TaskResult, Worker};
///
/// struct Printer;
///
/// #[async_trait]
/// impl Worker for Printer {
///     async fn exec(&self, _ctx: CancellationToken, mut task: Task) -> Task {
///         println!("{}", task.message);
///         task.result = TaskResult::succeed();
///         task
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Processes one task and returns it with the result set.
    async fn exec(&self, ctx: CancellationToken, task: Task) -> Task;
}

/// Function-backed worker.
///
/// Wraps a closure `F: Fn(CancellationToken, Task) -> Fut`; each call
/// produces a fresh future owning its task, so no shared mutable state
/// leaks between executor slots.
pub struct WorkerFn<F> {
    f: F,
}

impl<F> WorkerFn<F> {
    /// Creates a new function-backed worker.
    ///
    /// Prefer [`WorkerFn::arc`] when you immediately need a [`WorkerRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the worker and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use tokio_util::sync::CancellationToken;
    /// use topiq::{Task, TaskResult, WorkerFn, WorkerRef};
    ///
    /// let w: WorkerRef = WorkerFn::arc(|_ctx: CancellationToken, mut task: Task| async move {
    ///     task.result = TaskResult::succeed();
    ///     task
    /// });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Worker for WorkerFn<F>
where
    F: Fn(CancellationToken, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Task> + Send + 'static,
{
    async fn exec(&self, ctx: CancellationToken, task: Task) -> Task {
        (self.f)(ctx, task).await
    }
}
