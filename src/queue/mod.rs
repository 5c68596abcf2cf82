//! # Queue port: the seam between the engine and message stores.
//!
//! [`Queue`] is the narrow abstraction the engine consumes. Backends are
//! external collaborators (Redis lists, Kafka, ...); this crate ships one
//! implementation, [`MemoryQueue`], for tests and demos.
//!
//! ## Contract
//! - `dequeue` must **not** block indefinitely: it returns promptly with
//!   `Ok(None)` when nothing is available. Backends with long-poll
//!   semantics cap their internal wait.
//! - An empty `message` inside `Some` is treated like `None` by the
//!   engine; prefer `None`.
//! - `token` is an opaque delivery receipt. Ack-less backends return an
//!   empty token and the engine skips the `ack` call.
//! - `extra` is an opaque parameter bag the engine forwards unchanged:
//!   the worker's registered extras on the pull path, the caller's on the
//!   enqueue path.

mod memory;

pub use memory::MemoryQueue;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;

/// Opaque per-backend parameters forwarded verbatim by the engine.
pub type Extra = Vec<serde_json::Value>;

/// One delivery handed out by [`Queue::dequeue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dequeued {
    /// The stored payload.
    pub message: String,
    /// Delivery receipt for [`Queue::ack`]; empty for ack-less backends.
    pub token: String,
    /// How many times this message has been delivered, backend-supplied.
    pub dequeue_count: i64,
}

/// Polymorphic handle to a FIFO-like message store.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Appends one message under `topic`.
    async fn enqueue(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        message: &str,
        extra: &Extra,
    ) -> Result<bool, QueueError>;

    /// Appends a batch of messages under `topic`.
    async fn batch_enqueue(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        messages: &[String],
        extra: &Extra,
    ) -> Result<bool, QueueError>;

    /// Pops the next message for `topic`, or `Ok(None)` when the queue is
    /// empty. Must return promptly.
    async fn dequeue(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        extra: &Extra,
    ) -> Result<Option<Dequeued>, QueueError>;

    /// Acknowledges a delivery by token. May be a no-op for backends
    /// without delivery receipts; the engine never calls this with an
    /// empty token.
    async fn ack(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        token: &str,
        extra: &Extra,
    ) -> Result<bool, QueueError>;
}
