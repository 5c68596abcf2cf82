//! # TopicWorker: the per-topic runtime.
//!
//! One [`TopicWorker`] owns everything a single topic needs: the queue
//! handle, the handler, and a bounded executor pool. At engine start it
//! spawns two loops connected by a bounded channel:
//!
//! ```text
//! producer ──► [pending channel, cap = size] ──► dispatcher
//!                                                   │ acquire permit
//!                                                   ▼
//!                                         executor slot (≤ size)
//!                                            │ before hook
//!                                            │ handler (catch_unwind)
//!                                            │ ack decision
//!                                            └ after hook
//! ```
//!
//! ## Rules
//! - At most `size` handlers run concurrently per topic; with the pending
//!   channel that bounds in-flight work at `2 * size` tasks.
//! - A real dequeue error or an empty pull backs the producer off via the
//!   engine-wide adaptive sleep; the first productive pull resets it.
//! - When the pending channel is full, the producer retries the hand-off
//!   every `timer`, re-checking the running flags between attempts. If
//!   the engine stops during that wait the in-hand task is dropped: the
//!   documented single-task loss window at shutdown.
//! - A handler panic is confined to its slot: counted, reported, and the
//!   topic keeps running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::engine::Shared;
use crate::hooks::{panic_message, Callbacks};
use crate::queue::{Extra, Queue};
use crate::tasks::{Task, WorkerRef};

/// Lifecycle of one topic worker, derived from the engine flags and the
/// topic's executor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered, engine not started.
    Initialized,
    /// Producer and dispatcher loops are live.
    Running,
    /// Engine stopped (or worker closed) with handlers still executing.
    Stopping,
    /// Stopped and no handler executing.
    Drained,
}

/// Per-topic runtime: producer, dispatcher, and a bounded executor pool.
pub struct TopicWorker {
    shared: Arc<Shared>,
    queue: Arc<dyn Queue>,
    topic: String,
    worker: WorkerRef,
    extra: Extra,
    size: usize,
    pool: Arc<Semaphore>,
    working: AtomicBool,
    started: AtomicBool,
}

impl TopicWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        queue: Arc<dyn Queue>,
        topic: String,
        worker: WorkerRef,
        size: usize,
        extra: Extra,
    ) -> Self {
        Self {
            shared,
            queue,
            topic,
            worker,
            extra,
            size,
            pool: Arc::new(Semaphore::new(size)),
            working: AtomicBool::new(true),
            started: AtomicBool::new(false),
        }
    }

    /// The topic this worker serves.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The queue this worker pulls from.
    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    /// Executor pool capacity.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The opaque backend parameters registered with this worker.
    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    /// Handlers of this topic executing right now. Never exceeds
    /// [`size`](Self::size).
    pub fn in_flight(&self) -> usize {
        self.size - self.pool.available_permits()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        if !self.started.load(Ordering::Acquire) {
            WorkerState::Initialized
        } else if self.shared.is_running() && self.is_working() {
            WorkerState::Running
        } else if self.in_flight() > 0 {
            WorkerState::Stopping
        } else {
            WorkerState::Drained
        }
    }

    /// Stops this worker alone: the producer and dispatcher wind down and
    /// the pending channel drains away. Orthogonal to the engine's
    /// `stop()`, which clears the shared running flag instead.
    pub fn close(&self) {
        self.working.store(false, Ordering::Release);
    }

    fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    fn is_live(&self) -> bool {
        self.shared.is_running() && self.is_working()
    }

    /// Spawns the producer/dispatcher pair. Called once by the engine.
    pub(crate) fn run(self: Arc<Self>) {
        self.started.store(true, Ordering::Release);
        let (tx, rx) = mpsc::channel(self.size);

        let producer = Arc::clone(&self);
        tokio::spawn(async move { producer.produce(tx).await });

        tokio::spawn(async move { self.dispatch(rx).await });
    }

    /// Pull loop: dequeue, decode, hand off to the dispatcher.
    async fn produce(self: Arc<Self>, tx: mpsc::Sender<Task>) {
        let ctx = self.shared.cancellation();

        while self.is_live() {
            let pulled = self.queue.dequeue(&ctx, &self.topic, &self.extra).await;
            self.shared.counters.inc_pull();

            let delivery = match pulled {
                Err(err) => {
                    self.shared.counters.inc_pull_err();
                    error!(topic = %self.topic, error = %err, "dequeue failed");
                    self.shared.backoff.sleep().await;
                    continue;
                }
                Ok(None) => {
                    self.shared.counters.inc_pull_empty();
                    self.shared.backoff.sleep().await;
                    continue;
                }
                Ok(Some(d)) if d.message.is_empty() => {
                    self.shared.counters.inc_pull_empty();
                    self.shared.backoff.sleep().await;
                    continue;
                }
                Ok(Some(d)) => d,
            };

            self.shared.counters.inc_task();
            let mut task = match Task::decode(&delivery.message) {
                Ok(task) => task,
                Err(err) => {
                    self.shared.counters.inc_task_err();
                    error!(topic = %self.topic, error = %err, "task decode failed");
                    self.shared.backoff.sleep().await;
                    continue;
                }
            };

            // Raw payloads decode with an empty topic; they carry no
            // envelope, so the receipt stays detached and ack is skipped.
            if !task.topic.is_empty() {
                task.token = delivery.token;
            }
            task.dequeue_count = delivery.dequeue_count;
            self.shared.backoff.reset();

            let mut task = match tx.try_send(task) {
                Ok(()) => continue,
                Err(TrySendError::Full(task)) => task,
                Err(TrySendError::Closed(_)) => return,
            };

            // Channel full: retry every `timer`, watching the flags so a
            // stopped engine is noticed promptly.
            loop {
                if !self.is_live() {
                    warn!(
                        topic = %self.topic,
                        id = %task.id,
                        "worker stopped with a pulled task in hand; task dropped"
                    );
                    return;
                }
                match tx.send_timeout(task, self.shared.timer()).await {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(returned)) => task = returned,
                    Err(SendTimeoutError::Closed(_)) => return,
                }
            }
        }
    }

    /// Consume loop: receive pending tasks and submit them to the pool.
    ///
    /// Pool submission is the backpressure point: acquiring a permit
    /// blocks while all `size` slots are busy.
    async fn dispatch(self: Arc<Self>, mut rx: mpsc::Receiver<Task>) {
        let ctx = self.shared.cancellation();

        while self.is_live() {
            // Biased so a cancelled engine never picks up another task.
            let task = tokio::select! {
                biased;
                _ = ctx.cancelled() => return,
                received = rx.recv() => match received {
                    Some(task) => task,
                    None => return,
                },
            };

            let permit = match Arc::clone(&self.pool).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(topic = %self.topic, "executor pool closed; task dropped");
                    continue;
                }
            };

            let slot = Arc::clone(&self);
            tokio::spawn(async move {
                slot.process_task(task).await;
                drop(permit);
            });
        }
    }

    /// One executor slot: hooks, handler with panic isolation, ack.
    async fn process_task(&self, task: Task) {
        let _guard = self.shared.inflight.enter();
        let ctx = self.shared.cancellation().child_token();
        let callbacks = self.shared.callbacks();
        let snapshot = task.clone();

        let attempt = self.run_task(callbacks, ctx, task);
        if let Err(payload) = std::panic::AssertUnwindSafe(attempt).catch_unwind().await {
            self.shared.counters.inc_handle_panic();
            match &callbacks.panic {
                Some(hook) => hook(&snapshot, payload.as_ref()),
                None => error!(
                    topic = %self.topic,
                    id = %snapshot.id,
                    panic = panic_message(payload.as_ref()),
                    "task handler panicked"
                ),
            }
        }
    }

    async fn run_task(&self, callbacks: &Callbacks, ctx: CancellationToken, task: Task) {
        if let Some(hook) = &callbacks.before {
            hook(&task);
        }

        let task = self.worker.exec(ctx.clone(), task).await;

        self.shared.counters.inc_handle();
        let state = task.result.state;
        if state.is_error() {
            self.shared.counters.inc_handle_err();
        }

        if state.should_ack() && !task.token.is_empty() {
            if let Err(err) = self
                .queue
                .ack(&ctx, &self.topic, &task.token, &self.extra)
                .await
            {
                // Ack is terminal: bail before the after hook.
                error!(topic = %self.topic, id = %task.id, error = %err, "ack failed");
                return;
            }
            debug!(topic = %self.topic, id = %task.id, "task acked");
        }

        if let Some(hook) = &callbacks.after {
            hook(&task);
        }
    }
}
