//! Engine internals: lifecycle controller, per-topic runtime, and the
//! in-flight gauge that connects executors to `wait_stop`.

mod engine;
mod inflight;
mod topic;

pub use engine::Engine;
pub use topic::{TopicWorker, WorkerState};
