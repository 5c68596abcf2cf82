//! # Engine: registry of topic workers and lifecycle controller.
//!
//! The [`Engine`] owns the topic→worker registry, the shared counter
//! block, the adaptive backoff state, and the callback record, and it
//! drives the lifecycle every topic follows:
//!
//! ```text
//! Initialized ──start()──► Running ──stop()──► Stopping ──drain──► Drained
//! ```
//!
//! ## Rules
//! - The registry is **frozen at start**: `add_func`/`add_worker` are
//!   registration-time operations and duplicates are rejected.
//! - `start()` and `wait_stop()` are once-latched; `stop()` never blocks
//!   and never closes channels.
//! - Callbacks are installed before start and frozen into a `OnceLock`,
//!   so they cannot be reassigned while workers read them.
//! - There is no backward edge out of Stopping: a stopped engine does not
//!   restart.
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
//!     engine.add_func(queue, "mail", |_ctx: CancellationToken, mut task: Task| async move {
//!         println!("sending {}", task.message);
//!         task.result = TaskResult::succeed();
//!         task
//!     }, 2, Vec::new())?;
//!
//!     let ctx = CancellationToken::new();
//!     engine.enqueue(&ctx, "mail", "hello", &Vec::new()).await?;
//!
//!     engine.start();
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//!     engine.stop();
//!     engine.wait_stop(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::core::inflight::InFlight;
use crate::core::topic::TopicWorker;
use crate::error::EngineError;
use crate::hooks::{Callbacks, TaskCallback, TaskPanicCallback};
use crate::policies::AdaptiveSleep;
use crate::queue::{Extra, Queue};
use crate::stats::Counters;
use crate::tasks::{Task, Worker, WorkerFn};

/// State every topic worker of one engine reads on its hot paths.
pub(crate) struct Shared {
    running: AtomicBool,
    token: CancellationToken,
    pub(crate) counters: Counters,
    pub(crate) backoff: AdaptiveSleep,
    pub(crate) inflight: InFlight,
    timer: AtomicU64,
    callbacks: OnceLock<Callbacks>,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            running: AtomicBool::new(false),
            token: CancellationToken::new(),
            counters: Counters::default(),
            backoff: AdaptiveSleep::new(config.init_sleepy, config.max_sleepy, config.jitter),
            inflight: InFlight::default(),
            timer: AtomicU64::new(u64::try_from(config.timer.as_nanos()).unwrap_or(u64::MAX)),
            callbacks: OnceLock::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn timer(&self) -> Duration {
        Duration::from_nanos(self.timer.load(Ordering::Relaxed))
    }

    pub(crate) fn callbacks(&self) -> &Callbacks {
        self.callbacks.get_or_init(Callbacks::default)
    }
}

/// Multi-topic worker engine.
///
/// Construct, register topics, optionally tune backoff and install
/// callbacks, then [`start`](Engine::start). See the module docs for the
/// lifecycle.
pub struct Engine {
    shared: Arc<Shared>,
    workers: HashMap<String, Arc<TopicWorker>>,
    callbacks: Callbacks,
    started: AtomicBool,
    waited: AtomicBool,
    drain: Duration,
    concurrency: usize,
}

impl Engine {
    /// Creates an engine with [`Config::default`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an engine with explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared::new(&config)),
            workers: HashMap::new(),
            callbacks: Callbacks::default(),
            started: AtomicBool::new(false),
            waited: AtomicBool::new(false),
            drain: config.drain,
            concurrency: config.concurrency.max(1),
        }
    }

    // ---- registration -----------------------------------------------

    /// Builds a topic worker without registering it.
    ///
    /// `size == 0` selects the configured default concurrency. Fails with
    /// [`EngineError::EmptyTopic`] on an empty topic.
    pub fn new_worker(
        &self,
        queue: Arc<dyn Queue>,
        topic: impl Into<String>,
        worker: Arc<dyn Worker>,
        size: usize,
        extra: Extra,
    ) -> Result<TopicWorker, EngineError> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(EngineError::EmptyTopic);
        }
        let size = if size == 0 { self.concurrency } else { size };
        Ok(TopicWorker::new(
            Arc::clone(&self.shared),
            queue,
            topic,
            worker,
            size,
            extra,
        ))
    }

    /// Registers a prebuilt topic worker.
    ///
    /// Fails with [`EngineError::TopicRegistered`] if the topic already
    /// has a worker; the prior registration stays intact.
    pub fn add_worker(&mut self, worker: TopicWorker) -> Result<(), EngineError> {
        let topic = worker.topic().to_string();
        if self.workers.contains_key(&topic) {
            return Err(EngineError::TopicRegistered { topic });
        }
        self.workers.insert(topic, Arc::new(worker));
        Ok(())
    }

    /// Registers a function-backed worker for `topic`.
    ///
    /// The closure receives the engine's cancellation token and the task,
    /// and returns the task with its result set.
    pub fn add_func<F, Fut>(
        &mut self,
        queue: Arc<dyn Queue>,
        topic: impl Into<String>,
        f: F,
        size: usize,
        extra: Extra,
    ) -> Result<(), EngineError>
    where
        F: Fn(CancellationToken, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Task> + Send + 'static,
    {
        let worker = self.new_worker(queue, topic, WorkerFn::arc(f), size, extra)?;
        self.add_worker(worker)
    }

    /// Looks up a registered topic worker.
    pub fn worker(&self, topic: &str) -> Option<&Arc<TopicWorker>> {
        self.workers.get(topic)
    }

    /// Registered topics, in no particular order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    // ---- lifecycle --------------------------------------------------

    /// Starts the producer/dispatcher pair of every registered worker.
    ///
    /// Once-latched: repeated calls (including after `stop()`) are no-ops.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.callbacks.set(self.callbacks.clone());
        self.shared.running.store(true, Ordering::Release);
        for worker in self.workers.values() {
            Arc::clone(worker).run();
        }
        debug!(topics = self.workers.len(), "engine started");
    }

    /// Signals every worker to stop pulling and cancels the engine
    /// context. Returns immediately; in-flight handlers keep running.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.token.cancel();
        debug!("engine stopping");
    }

    /// Waits for in-flight handlers to drain, bounded by `timeout`
    /// (a zero timeout selects the configured default, 10 s).
    ///
    /// Once-latched: the first call performs one backoff cycle and then
    /// waits; later calls return `Ok(())` immediately, even if the first
    /// timed out. Returns [`EngineError::Timeout`] when the deadline
    /// fires first; the stragglers keep running.
    pub async fn wait_stop(&self, timeout: Duration) -> Result<(), EngineError> {
        if self.waited.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shared.backoff.sleep().await;
        let timeout = if timeout.is_zero() { self.drain } else { timeout };

        match time::timeout(timeout, self.shared.inflight.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(EngineError::Timeout),
        }
    }

    /// Handlers executing right now, across all topics.
    pub fn in_flight(&self) -> usize {
        self.shared.inflight.count()
    }

    /// The current adaptive backoff value.
    ///
    /// Grows toward `max_sleepy` while the queues stay quiet and snaps
    /// back to `init_sleepy` on the first productive pull.
    pub fn sleepy(&self) -> Duration {
        self.shared.backoff.current()
    }

    // ---- tuning -----------------------------------------------------

    /// Reconfigures the adaptive backoff. `max` defaults to `init`.
    pub fn set_sleepy(&self, init: Duration, max: Option<Duration>) {
        self.shared.backoff.configure(init, max);
    }

    /// Sets how often a producer blocked on a full pending channel
    /// re-checks the running flags.
    pub fn set_timer(&self, timer: Duration) {
        self.shared
            .timer
            .store(u64::try_from(timer.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Snapshot of the engine counters. Keys are stable; the snapshot is
    /// not a consistent instant (counters are read without a lock).
    pub fn stats(&self) -> HashMap<&'static str, i64> {
        self.shared.counters.snapshot()
    }

    // ---- callbacks --------------------------------------------------

    /// Installs the pre-execution hook. Call before `start()`.
    pub fn on_task_before(&mut self, f: impl Fn(&Task) + Send + Sync + 'static) {
        self.callbacks.before = Some(Arc::new(f) as TaskCallback);
    }

    /// Installs the post-execution hook. Call before `start()`.
    pub fn on_task_after(&mut self, f: impl Fn(&Task) + Send + Sync + 'static) {
        self.callbacks.after = Some(Arc::new(f) as TaskCallback);
    }

    /// Installs the panic hook, which replaces the default log line when
    /// a handler panics. The hook must not panic itself. Call before
    /// `start()`.
    pub fn on_task_panic(
        &mut self,
        f: impl Fn(&Task, &(dyn std::any::Any + Send)) + Send + Sync + 'static,
    ) {
        self.callbacks.panic = Some(Arc::new(f) as TaskPanicCallback);
    }

    /// Installs the failed-task hook. Reserved: the field is carried but
    /// the engine does not invoke it yet.
    pub fn on_task_error(&mut self, f: impl Fn(&Task) + Send + Sync + 'static) {
        self.callbacks.error = Some(Arc::new(f) as TaskCallback);
    }

    // ---- enqueue helpers --------------------------------------------

    fn queue_by_topic(&self, topic: &str) -> Result<&Arc<dyn Queue>, EngineError> {
        self.workers
            .get(topic)
            .map(|worker| worker.queue())
            .ok_or_else(|| EngineError::QueueNotExist {
                topic: topic.to_string(),
            })
    }

    /// Wraps `message` in a freshly minted task and enqueues it.
    pub async fn enqueue(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        message: &str,
        extra: &Extra,
    ) -> Result<bool, EngineError> {
        self.enqueue_with_task(ctx, topic, Task::generate(topic, message), extra)
            .await
    }

    /// Encodes and enqueues an explicit task, stamping the topic when the
    /// envelope left it empty.
    pub async fn enqueue_with_task(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        mut task: Task,
        extra: &Extra,
    ) -> Result<bool, EngineError> {
        let queue = self.queue_by_topic(topic)?;
        if task.topic.is_empty() {
            task.topic = topic.to_string();
        }
        let encoded = task.encode()?;
        Ok(queue.enqueue(ctx, topic, &encoded, extra).await?)
    }

    /// Enqueues a raw payload without the task envelope.
    ///
    /// The consuming side must expect raw messages; the engine will not
    /// attach a delivery token to them, so they are never acked.
    pub async fn enqueue_raw(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        message: &str,
        extra: &Extra,
    ) -> Result<bool, EngineError> {
        let queue = self.queue_by_topic(topic)?;
        Ok(queue.enqueue(ctx, topic, message, extra).await?)
    }

    /// Mints one task per message and batch-enqueues them.
    pub async fn batch_enqueue(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        messages: &[String],
        extra: &Extra,
    ) -> Result<bool, EngineError> {
        let tasks = messages
            .iter()
            .map(|message| Task::generate(topic, message.clone()))
            .collect();
        self.batch_enqueue_with_task(ctx, topic, tasks, extra).await
    }

    /// Encodes each task individually and calls the backend's batch
    /// operation once.
    pub async fn batch_enqueue_with_task(
        &self,
        ctx: &CancellationToken,
        topic: &str,
        tasks: Vec<Task>,
        extra: &Extra,
    ) -> Result<bool, EngineError> {
        let queue = self.queue_by_topic(topic)?;
        let mut encoded = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if task.topic.is_empty() {
                task.topic = topic.to_string();
            }
            encoded.push(task.encode()?);
        }
        Ok(queue.batch_enqueue(ctx, topic, &encoded, extra).await?)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
