//! # Example: graceful_stop
//!
//! Loads one topic with work, stops the engine mid-flight, and shows the
//! drain accounting: handled + remaining always adds up, and unacked
//! messages stay recoverable in the backend.
//!
//! ## Run
//! ```bash
//! cargo run --example graceful_stop
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use topiq::{Engine, MemoryQueue, Queue, Task, TaskResult};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();

    let handle: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;
    engine.add_func(
        handle,
        "crunch",
        |_ctx: CancellationToken, mut task: Task| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            task.result = TaskResult::succeed();
            task
        },
        10,
        Vec::new(),
    )?;

    let ctx = CancellationToken::new();
    let batch: Vec<String> = (0..500).map(|i| format!("job-{i}")).collect();
    engine.batch_enqueue(&ctx, "crunch", &batch, &Vec::new()).await?;

    engine.start();
    tokio::time::sleep(Duration::from_millis(300)).await;

    engine.stop();
    match engine.wait_stop(Duration::from_secs(10)).await {
        Ok(()) => println!("drained cleanly"),
        Err(err) => println!("drain ended with: {err}"),
    }

    let handled = engine.stats()["handle"];
    let ready = queue.len("crunch").await;
    let unacked = queue.unacked_len("crunch").await;
    println!("handled={handled} ready={ready} unacked={unacked}");
    println!("accounted: {}", handled + ready as i64 + unacked as i64);
    Ok(())
}
