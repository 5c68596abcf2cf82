//! # Task envelope and result protocol.
//!
//! A [`Task`] is one unit of work: an envelope around a single queue
//! message plus execution metadata. Tasks are minted by the enqueue
//! helpers ([`Task::generate`]) or reconstructed from the wire by
//! [`Task::decode`], and are owned by exactly one executor slot from
//! dispatch until the post-callback returns.
//!
//! ## Wire form
//! Tasks round-trip through JSON with self-describing field names.
//! Every field is optional on decode; missing fields take their zero
//! values, so a payload of `{"id":"..","topic":"t1","message":".."}`
//! (the shape the enqueue helpers produce) is a complete task. `token`,
//! `dequeue_count`, and `result` are runtime-only and are normally absent
//! from enqueued payloads.
//!
//! ## Result protocol
//! Handlers set [`Task::result`] before returning; the zero value is
//! [`ResultState::Succeed`]. The state decides acknowledgment:
//!
//! | state | ack? | counted as error? |
//! |---|---|---|
//! | `Succeed` | yes | no |
//! | `Failed` | no | yes |
//! | `FailedWithAck` | yes | yes |
//! | `FailedWithRetryNumLimit` | yes | no |

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal state a handler assigns to a task.
///
/// Serialized as its integer code (`0..=3`) for wire stability; unknown
/// codes decode to the zero value, `Succeed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResultState {
    /// Processed successfully; the message is acknowledged.
    #[default]
    Succeed,
    /// Processing failed; no ack, so a capable backend will redeliver.
    Failed,
    /// Processing failed but the message is acknowledged anyway.
    FailedWithAck,
    /// The delivery count exceeded the caller's limit; acknowledged to
    /// stop further redelivery.
    FailedWithRetryNumLimit,
}

impl ResultState {
    /// Whether this state triggers an ack (given a non-empty token).
    pub fn should_ack(self) -> bool {
        !matches!(self, ResultState::Failed)
    }

    /// Whether this state counts toward `handle_err`.
    pub fn is_error(self) -> bool {
        matches!(self, ResultState::Failed | ResultState::FailedWithAck)
    }
}

impl From<i64> for ResultState {
    fn from(code: i64) -> Self {
        match code {
            1 => ResultState::Failed,
            2 => ResultState::FailedWithAck,
            3 => ResultState::FailedWithRetryNumLimit,
            _ => ResultState::Succeed,
        }
    }
}

impl From<ResultState> for i64 {
    fn from(state: ResultState) -> Self {
        match state {
            ResultState::Succeed => 0,
            ResultState::Failed => 1,
            ResultState::FailedWithAck => 2,
            ResultState::FailedWithRetryNumLimit => 3,
        }
    }
}

/// Outcome a handler writes into the task before returning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Terminal state; drives the ack decision.
    #[serde(default)]
    pub state: ResultState,
    /// Free-form detail (error text, diagnostics).
    #[serde(default)]
    pub message: String,
}

impl TaskResult {
    /// A successful outcome.
    pub fn succeed() -> Self {
        Self::default()
    }

    /// A failed outcome that leaves the message unacked.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: ResultState::Failed,
            message: message.into(),
        }
    }

    /// A failed outcome that still acks the message.
    pub fn failed_with_ack(message: impl Into<String>) -> Self {
        Self {
            state: ResultState::FailedWithAck,
            message: message.into(),
        }
    }

    /// The delivery-limit outcome; acks to stop redelivery.
    pub fn failed_with_retry_limit(message: impl Into<String>) -> Self {
        Self {
            state: ResultState::FailedWithRetryNumLimit,
            message: message.into(),
        }
    }
}

/// One unit of work pulled from a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque unique id, generated at enqueue time.
    #[serde(default)]
    pub id: String,
    /// Routing key of the stream this task belongs to.
    #[serde(default)]
    pub topic: String,
    /// Opaque payload.
    #[serde(default)]
    pub message: String,
    /// Delivery receipt from the backend; empty when the backend is
    /// ack-less, in which case the engine skips the ack call.
    #[serde(default)]
    pub token: String,
    /// How many times the backend has delivered this message.
    #[serde(default)]
    pub dequeue_count: i64,
    /// Handler outcome; zero value is `Succeed`.
    #[serde(default)]
    pub result: TaskResult,
}

impl Task {
    /// Mints a fresh task with a generated id and the given routing key.
    pub fn generate(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Serializes the task to its JSON wire form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reconstructs a task from its JSON wire form.
    ///
    /// Missing fields decode to their zero values.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
