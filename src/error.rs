//! # Error types used by the engine and queue port.
//!
//! Two enums cover the crate:
//!
//! - [`EngineError`] errors surfaced by the engine's public operations.
//! - [`QueueError`] errors raised by queue backends.
//!
//! Both provide `as_label()` for logs and metrics. Note that an empty
//! queue is **not** an error: [`Queue::dequeue`](crate::Queue::dequeue)
//! signals it with `Ok(None)`.

use thiserror::Error;

/// Errors produced by the engine's public surface.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// An enqueue helper was called for a topic with no registered worker.
    #[error("no queue registered for topic '{topic}'")]
    QueueNotExist {
        /// The unknown topic.
        topic: String,
    },

    /// A worker was registered for a topic that already has one.
    ///
    /// The prior registration is left intact.
    #[error("topic '{topic}' is already registered")]
    TopicRegistered {
        /// The duplicate topic.
        topic: String,
    },

    /// A worker was registered with an empty topic string.
    #[error("topic can not be empty")]
    EmptyTopic,

    /// [`Engine::wait_stop`](crate::Engine::wait_stop) hit its deadline
    /// before all in-flight handlers drained.
    #[error("timed out waiting for in-flight tasks to drain")]
    Timeout,

    /// A task failed to serialize inside an enqueue helper.
    #[error("task encode error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A queue backend error bubbled up through an enqueue helper.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl EngineError {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::QueueNotExist { .. } => "engine_queue_not_exist",
            EngineError::TopicRegistered { .. } => "engine_topic_registered",
            EngineError::EmptyTopic => "engine_empty_topic",
            EngineError::Timeout => "engine_timeout",
            EngineError::Codec(_) => "engine_codec",
            EngineError::Queue(_) => "engine_queue_error",
        }
    }
}

/// Errors produced by queue backends.
///
/// Emptiness is not represented here; `dequeue` returns `Ok(None)` for an
/// empty queue and the engine backs off without counting an error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum QueueError {
    /// The backend failed to serve the request.
    #[error("queue backend error: {reason}")]
    Backend {
        /// Backend-specific description.
        reason: String,
    },
}

impl QueueError {
    /// Convenience constructor for backend faults.
    pub fn backend(reason: impl Into<String>) -> Self {
        QueueError::Backend {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Backend { .. } => "queue_backend",
        }
    }
}
