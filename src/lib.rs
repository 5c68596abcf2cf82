//! # topiq
//!
//! **Topiq** is a topic-oriented background job runner: it continuously
//! pulls messages from pluggable queue backends, dispatches them into
//! per-topic bounded worker pools, and acknowledges them back under a
//! result-state protocol.
//!
//! ## Features
//!
//! | Area            | Description                                                        | Key types / traits                 |
//! |-----------------|--------------------------------------------------------------------|------------------------------------|
//! | **Engine**      | Register topics, start/stop, drain with a deadline, read counters. | [`Engine`], [`Config`]             |
//! | **Queue port**  | Narrow seam to FIFO-like stores; in-memory backend included.       | [`Queue`], [`MemoryQueue`]         |
//! | **Tasks**       | Envelope + JSON codec + result protocol driving acknowledgment.    | [`Task`], [`TaskResult`], [`ResultState`] |
//! | **Workers**     | Handlers as trait impls or plain closures.                         | [`Worker`], [`WorkerFn`]           |
//! | **Backoff**     | Adaptive pull sleep: doubling, capped, reset on productive pull.   | [`JitterPolicy`]                   |
//! | **Hooks**       | Before/after/panic callbacks around every execution.               | [`Engine::on_task_before`], ...    |
//! | **Errors**      | Sentinel taxonomy for registration, lookup, and drain timeout.     | [`EngineError`], [`QueueError`]    |
//!
//! ## Concurrency model
//!
//! Per topic: one producer task pulling from the queue, one dispatcher
//! task feeding a bounded executor pool of `size` slots through a bounded
//! channel of the same capacity, so a producer can never outrun the
//! handlers by more than `2 * size` tasks. Topics run independently and
//! share only the engine's counters, backoff state, and running flag.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use topiq::{Engine, MemoryQueue, Task, TaskResult};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = Arc::new(MemoryQueue::new());
//!     let mut engine = Engine::new();
//!
//!     // A handler is a closure from (token, task) to the finished task.
//!     engine.add_func(queue, "greetings", |_ctx: CancellationToken, mut task: Task| async move {
//!         println!("hello, {}", task.message);
//!         task.result = TaskResult::succeed();
//!         task
//!     }, 2, Vec::new())?;
//!
//!     let ctx = CancellationToken::new();
//!     engine.enqueue(&ctx, "greetings", "world", &Vec::new()).await?;
//!
//!     engine.start();
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!
//!     engine.stop();
//!     engine.wait_stop(Duration::from_secs(5)).await?;
//!     println!("{:?}", engine.stats());
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod hooks;
mod policies;
mod queue;
mod stats;
mod tasks;

// ---- Public re-exports ----

pub use crate::config::Config;
pub use crate::core::{Engine, TopicWorker, WorkerState};
pub use crate::error::{EngineError, QueueError};
pub use crate::hooks::{TaskCallback, TaskPanicCallback};
pub use crate::policies::JitterPolicy;
pub use crate::queue::{Dequeued, Extra, MemoryQueue, Queue};
pub use crate::stats::Counters;
pub use crate::tasks::{ResultState, Task, TaskResult, Worker, WorkerFn, WorkerRef};
