//! End-to-end engine scenarios against the in-memory backend and a
//! recording queue double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use topiq::{
    Config, Dequeued, Engine, EngineError, Extra, MemoryQueue, Queue, QueueError, ResultState,
    Task, TaskResult, WorkerState,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Polls `cond` every 10 ms until it holds or `deadline` elapses.
async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if cond() {
            return true;
        }
        if start.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(ms(10)).await;
    }
}

/// Queue double that hands out preloaded deliveries and records acks.
#[derive(Default)]
struct RecordingQueue {
    deliveries: Mutex<VecDeque<Dequeued>>,
    acks: Mutex<Vec<String>>,
}

impl RecordingQueue {
    fn preload(deliveries: Vec<Dequeued>) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(deliveries.into()),
            acks: Mutex::new(Vec::new()),
        })
    }

    fn acked(&self) -> Vec<String> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Queue for RecordingQueue {
    async fn enqueue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _message: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        Ok(true)
    }

    async fn batch_enqueue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _messages: &[String],
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        Ok(true)
    }

    async fn dequeue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _extra: &Extra,
    ) -> Result<Option<Dequeued>, QueueError> {
        Ok(self.deliveries.lock().unwrap().pop_front())
    }

    async fn ack(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        token: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        self.acks.lock().unwrap().push(token.to_string());
        Ok(true)
    }
}

/// Queue double whose dequeue always fails.
struct FailingQueue;

#[async_trait]
impl Queue for FailingQueue {
    async fn enqueue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _message: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        Ok(true)
    }

    async fn batch_enqueue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _messages: &[String],
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        Ok(true)
    }

    async fn dequeue(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _extra: &Extra,
    ) -> Result<Option<Dequeued>, QueueError> {
        Err(QueueError::backend("connection refused"))
    }

    async fn ack(
        &self,
        _ctx: &CancellationToken,
        _topic: &str,
        _token: &str,
        _extra: &Extra,
    ) -> Result<bool, QueueError> {
        Ok(true)
    }
}

// S1: register, enqueue three messages, drain, verify counters and acks.
#[tokio::test]
async fn happy_path_processes_and_acks_everything() {
    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    engine
        .add_func(
            handle,
            "t1",
            |_ctx, mut task: Task| async move {
                task.result = TaskResult::succeed();
                task
            },
            2,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    for message in ["a", "b", "c"] {
        engine.enqueue(&ctx, "t1", message, &Extra::new()).await.unwrap();
    }

    engine.start();
    assert!(wait_until(ms(2000), || engine.stats()["handle"] == 3).await);

    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    let stats = engine.stats();
    assert_eq!(stats["handle"], 3);
    assert_eq!(stats["task"], 3);
    assert_eq!(stats["pull_err"], 0);
    assert_eq!(stats["handle_err"], 0);
    assert_eq!(stats["handle_panic"], 0);
    // Everything acked: nothing ready, nothing pending a receipt.
    assert_eq!(queue.len("t1").await, 0);
    assert_eq!(queue.unacked_len("t1").await, 0);
}

// S2: a panicking handler is isolated; the topic keeps going.
#[tokio::test]
async fn panic_is_isolated_and_reported() {
    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    let panicked = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&panicked);
    engine.on_task_panic(move |task, _payload| {
        sink.lock().unwrap().push(task.message.clone());
    });

    engine
        .add_func(
            handle,
            "t1",
            |_ctx, mut task: Task| async move {
                if task.message == "x" {
                    panic!("poison message");
                }
                task.result = TaskResult::succeed();
                task
            },
            1,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    engine.enqueue(&ctx, "t1", "x", &Extra::new()).await.unwrap();
    engine.enqueue(&ctx, "t1", "y", &Extra::new()).await.unwrap();

    engine.start();
    assert!(
        wait_until(ms(2000), || {
            let stats = engine.stats();
            stats["handle_panic"] == 1 && stats["handle"] == 1
        })
        .await
    );

    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    // The handler that returned is the only one counted in `handle`.
    let stats = engine.stats();
    assert_eq!(stats["handle_panic"], 1);
    assert_eq!(stats["handle"], 1);
    assert_eq!(stats["handle_err"], 0);
    assert_eq!(*panicked.lock().unwrap(), vec!["x".to_string()]);
    // "y" was acked; the poisoned "x" was not.
    assert_eq!(queue.unacked_len("t1").await, 1);
}

// S3: an empty queue drives the shared backoff to its cap.
#[tokio::test]
async fn empty_queue_backs_off_to_the_cap() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    engine
        .add_func(
            queue,
            "quiet",
            |_ctx, task: Task| async move { task },
            1,
            Extra::new(),
        )
        .unwrap();

    engine.set_sleepy(ms(10), Some(ms(80)));
    engine.start();
    tokio::time::sleep(ms(700)).await;
    engine.stop();

    let stats = engine.stats();
    assert!(stats["pull_empty"] >= 4, "pull_empty={}", stats["pull_empty"]);
    // The producer may sit between the two increments when we snapshot.
    assert!(stats["pull"] - stats["pull_empty"] <= 1);
    // 10 -> 20 -> 40 -> 80, then pinned at the cap.
    assert_eq!(engine.sleepy(), ms(80));
    // Backoff keeps the poll count small; no-backoff would be hundreds.
    assert!(stats["pull"] < 64, "pull={}", stats["pull"]);

    engine.wait_stop(ms(1000)).await.unwrap();
}

// S4: graceful stop drains in-flight work and loses nothing silently.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_stop_accounts_for_every_task() {
    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    engine
        .add_func(
            handle,
            "t1",
            |_ctx, mut task: Task| async move {
                tokio::time::sleep(ms(50)).await;
                task.result = TaskResult::succeed();
                task
            },
            10,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    let batch: Vec<String> = (0..100).map(|i| format!("m{i}")).collect();
    engine.batch_enqueue(&ctx, "t1", &batch, &Extra::new()).await.unwrap();

    engine.start();
    tokio::time::sleep(ms(200)).await;
    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    assert_eq!(engine.in_flight(), 0);

    // Handled tasks were acked away; the rest are either still ready or
    // sit unacked (pulled into the pipeline, recoverable by redelivery).
    let handled = usize::try_from(engine.stats()["handle"]).unwrap();
    let remaining = queue.len("t1").await + queue.unacked_len("t1").await;
    assert_eq!(handled + remaining, 100);
    assert!(handled >= 10, "handled={handled}");
}

// S5: wait_stop times out on a stuck handler and is once-latched.
#[tokio::test]
async fn wait_stop_times_out_then_latches() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);

    engine
        .add_func(
            queue,
            "slow",
            move |_ctx, mut task: Task| {
                let flag = Arc::clone(&flag);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    tokio::time::sleep(ms(2000)).await;
                    task.result = TaskResult::succeed();
                    task
                }
            },
            1,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    engine.enqueue(&ctx, "slow", "one", &Extra::new()).await.unwrap();

    engine.start();
    assert!(wait_until(ms(1000), || started.load(Ordering::SeqCst)).await);
    engine.stop();

    let err = engine.wait_stop(ms(100)).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
    assert_eq!(engine.in_flight(), 1);

    // Second call returns immediately even though the handler still runs.
    let before = tokio::time::Instant::now();
    engine.wait_stop(ms(5000)).await.unwrap();
    assert!(before.elapsed() < ms(500));
}

// S6: the ack side-effect matrix, including the empty-token and
// envelope-less cases.
#[tokio::test]
async fn ack_protocol_matrix() {
    fn delivery(message: &str, token: &str) -> Dequeued {
        let task = Task::generate("acks", message);
        Dequeued {
            message: task.encode().unwrap(),
            token: token.to_string(),
            dequeue_count: 1,
        }
    }

    let mut deliveries = vec![
        delivery("succeed", "tok-succeed"),
        delivery("failed", "tok-failed"),
        delivery("failed_with_ack", "tok-failed-with-ack"),
        delivery("retry_limit", "tok-retry-limit"),
        // Ack-less backend: state says ack, token says skip.
        delivery("succeed", ""),
    ];
    // Envelope-less payload: decodes with an empty topic, so the engine
    // never attaches the receipt and never acks it.
    deliveries.push(Dequeued {
        message: r#"{"message":"bare"}"#.to_string(),
        token: "tok-bare".to_string(),
        dequeue_count: 1,
    });

    let queue = RecordingQueue::preload(deliveries);
    let mut engine = Engine::new();
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    engine
        .add_func(
            handle,
            "acks",
            |_ctx, mut task: Task| async move {
                task.result = match task.message.as_str() {
                    "failed" => TaskResult::failed("nope"),
                    "failed_with_ack" => TaskResult::failed_with_ack("nope"),
                    "retry_limit" => TaskResult::failed_with_retry_limit("too many"),
                    _ => TaskResult::succeed(),
                };
                task
            },
            1,
            Extra::new(),
        )
        .unwrap();

    engine.start();
    assert!(wait_until(ms(2000), || engine.stats()["handle"] == 6).await);
    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    let mut acked = queue.acked();
    acked.sort();
    assert_eq!(
        acked,
        vec![
            "tok-failed-with-ack".to_string(),
            "tok-retry-limit".to_string(),
            "tok-succeed".to_string(),
        ]
    );

    let stats = engine.stats();
    assert_eq!(stats["handle"], 6);
    // failed + failed_with_ack count as errors; retry_limit does not.
    assert_eq!(stats["handle_err"], 2);
}

// Invariant 1: per-topic concurrency never exceeds the pool size.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_stays_within_pool_size() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (cur, max) = (Arc::clone(&current), Arc::clone(&peak));

    engine
        .add_func(
            queue,
            "bounded",
            move |_ctx, mut task: Task| {
                let (cur, max) = (Arc::clone(&cur), Arc::clone(&max));
                async move {
                    let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(ms(15)).await;
                    cur.fetch_sub(1, Ordering::SeqCst);
                    task.result = TaskResult::succeed();
                    task
                }
            },
            3,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    let batch: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    engine.batch_enqueue(&ctx, "bounded", &batch, &Extra::new()).await.unwrap();

    engine.start();
    assert!(wait_until(ms(5000), || engine.stats()["handle"] == 20).await);
    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 3, "peak={}", peak.load(Ordering::SeqCst));
    assert!(peak.load(Ordering::SeqCst) >= 2, "pool never filled");
}

// Dequeue errors are counted and backed off, never fatal.
#[tokio::test]
async fn dequeue_errors_are_survivable() {
    let queue: Arc<dyn Queue> = Arc::new(FailingQueue);
    let mut engine = Engine::new();
    engine
        .add_func(
            queue,
            "broken",
            |_ctx, task: Task| async move { task },
            1,
            Extra::new(),
        )
        .unwrap();

    engine.start();
    assert!(wait_until(ms(2000), || engine.stats()["pull_err"] >= 2).await);

    let stats = engine.stats();
    assert!(stats["pull"] - stats["pull_err"] <= 1);
    assert_eq!(stats["handle"], 0);

    engine.stop();
    engine.wait_stop(ms(1000)).await.unwrap();
}

// A payload that is not a task envelope counts as a decode failure and
// is dropped without ack.
#[tokio::test]
async fn undecodable_payload_counts_task_err() {
    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    engine
        .add_func(
            handle,
            "t1",
            |_ctx, mut task: Task| async move {
                task.result = TaskResult::succeed();
                task
            },
            1,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    engine.enqueue_raw(&ctx, "t1", "definitely not json", &Extra::new()).await.unwrap();

    engine.start();
    assert!(wait_until(ms(2000), || engine.stats()["task_err"] == 1).await);

    let stats = engine.stats();
    assert_eq!(stats["task"], 1);
    assert_eq!(stats["handle"], 0);

    engine.stop();
    engine.wait_stop(ms(1000)).await.unwrap();
}

// Before/after hooks wrap every execution; the reserved error hook
// stays silent.
#[tokio::test]
async fn hooks_fire_around_each_execution() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();

    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let reserved_fired = Arc::new(AtomicBool::new(false));

    let b = Arc::clone(&before);
    engine.on_task_before(move |_task| {
        b.fetch_add(1, Ordering::SeqCst);
    });
    let a = Arc::clone(&after);
    engine.on_task_after(move |task| {
        assert_eq!(task.result.state, ResultState::Succeed);
        a.fetch_add(1, Ordering::SeqCst);
    });
    let r = Arc::clone(&reserved_fired);
    engine.on_task_error(move |_task| {
        r.store(true, Ordering::SeqCst);
    });

    engine
        .add_func(
            queue,
            "hooked",
            |_ctx, mut task: Task| async move {
                task.result = TaskResult::succeed();
                task
            },
            2,
            Extra::new(),
        )
        .unwrap();

    let ctx = CancellationToken::new();
    let batch: Vec<String> = (0..3).map(|i| i.to_string()).collect();
    engine.batch_enqueue(&ctx, "hooked", &batch, &Extra::new()).await.unwrap();

    engine.start();
    assert!(wait_until(ms(2000), || engine.stats()["handle"] == 3).await);
    engine.stop();
    engine.wait_stop(ms(5000)).await.unwrap();

    assert_eq!(before.load(Ordering::SeqCst), 3);
    assert_eq!(after.load(Ordering::SeqCst), 3);
    assert!(!reserved_fired.load(Ordering::SeqCst));
}

// Topic workers walk Initialized -> Running -> Drained.
#[tokio::test]
async fn worker_state_follows_lifecycle() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();
    engine
        .add_func(
            queue,
            "t1",
            |_ctx, mut task: Task| async move {
                task.result = TaskResult::succeed();
                task
            },
            1,
            Extra::new(),
        )
        .unwrap();

    assert_eq!(engine.worker("t1").unwrap().state(), WorkerState::Initialized);

    engine.start();
    assert_eq!(engine.worker("t1").unwrap().state(), WorkerState::Running);

    engine.stop();
    engine.wait_stop(ms(1000)).await.unwrap();
    assert_eq!(engine.worker("t1").unwrap().state(), WorkerState::Drained);
}

// Start is once-latched; a stopped engine does not restart.
#[tokio::test]
async fn start_is_idempotent_and_terminal() {
    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::with_config(Config::default());
    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;

    engine
        .add_func(
            handle,
            "t1",
            |_ctx, mut task: Task| async move {
                task.result = TaskResult::succeed();
                task
            },
            1,
            Extra::new(),
        )
        .unwrap();

    engine.start();
    engine.start();
    engine.stop();
    engine.wait_stop(ms(1000)).await.unwrap();

    // No backward edge out of Stopping: restarting does nothing.
    engine.start();
    assert_eq!(engine.worker("t1").unwrap().state(), WorkerState::Drained);

    let ctx = CancellationToken::new();
    engine.enqueue(&ctx, "t1", "late", &Extra::new()).await.unwrap();
    tokio::time::sleep(ms(100)).await;
    assert_eq!(engine.stats()["handle"], 0);
    assert_eq!(queue.len("t1").await, 1);
}
