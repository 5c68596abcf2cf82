//! In-memory queue backend.
//!
//! Per-topic FIFOs guarded by one async mutex. Dequeued messages move to
//! an unacked table keyed by a minted token; acking drops them, and
//! [`MemoryQueue::redeliver_unacked`] puts them back at the head with
//! their delivery count intact. Intended for tests, demos, and as the
//! reference for the [`Queue`] contract.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::{Dequeued, Extra, Queue};

#[derive(Debug, Clone)]
struct Stored {
    payload: String,
    deliveries: i64,
}

#[derive(Default)]
struct TopicState {
    ready: VecDeque<Stored>,
    unacked: HashMap<String, Stored>,
}

/// In-memory [`Queue`] implementation.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting (not yet dequeued) under `topic`.
    pub async fn len(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map_or(0, |t| t.ready.len())
    }

    /// Number of dequeued-but-unacked messages under `topic`.
    pub async fn unacked_len(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map_or(0, |t| t.unacked.len())
    }

    /// Moves every unacked message back to the head of its topic queue,
    /// preserving delivery counts. Returns how many were requeued.
    pub async fn redeliver_unacked(&self, topic: &str) -> usize {
        let mut topics = self.topics.lock().await;
        let Some(state) = topics.get_mut(topic) else {
            return 0;
        };
        let n = state.unacked.len();
        for (_, stored) in state.unacked.drain() {
            state.ready.push_front(stored);
        }
        n
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(
        &self,
        _ctx: &CancellationToken,
        topic: &str,
        message: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default().ready.push_back(Stored {
            payload: message.to_string(),
            deliveries: 0,
        });
        Ok(true)
    }

    async fn batch_enqueue(
        &self,
        _ctx: &CancellationToken,
        topic: &str,
        messages: &[String],
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        for message in messages {
            state.ready.push_back(Stored {
                payload: message.clone(),
                deliveries: 0,
            });
        }
        Ok(true)
    }

    async fn dequeue(
        &self,
        _ctx: &CancellationToken,
        topic: &str,
        _extra: &Extra,
    ) -> Result<Option<Dequeued>, QueueError> {
        let mut topics = self.topics.lock().await;
        let Some(state) = topics.get_mut(topic) else {
            return Ok(None);
        };
        let Some(mut stored) = state.ready.pop_front() else {
            return Ok(None);
        };

        stored.deliveries += 1;
        let token = Uuid::new_v4().to_string();
        let delivery = Dequeued {
            message: stored.payload.clone(),
            token: token.clone(),
            dequeue_count: stored.deliveries,
        };
        state.unacked.insert(token, stored);
        Ok(Some(delivery))
    }

    async fn ack(
        &self,
        _ctx: &CancellationToken,
        topic: &str,
        token: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        let mut topics = self.topics.lock().await;
        let Some(state) = topics.get_mut(topic) else {
            return Ok(false);
        };
        Ok(state.unacked.remove(token).is_some())
    }
}
