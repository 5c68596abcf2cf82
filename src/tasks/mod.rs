//! Task envelope, result protocol, and the worker handler seam.

mod task;
mod worker;

pub use task::{ResultState, Task, TaskResult};
pub use worker::{Worker, WorkerFn, WorkerRef};
