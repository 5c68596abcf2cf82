//! # Example: basic
//!
//! Registers two topics on an in-memory queue, enqueues a few messages,
//! and drains them through the engine.
//!
//! ## Flow
//! ```text
//! enqueue("mail", ..) x3 ──► producer pulls ──► pool executes handler
//! enqueue("sms", ..)  x2 ──► producer pulls ──► pool executes handler
//! stop() + wait_stop() ──► stats printed
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example basic
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use topiq::{Engine, MemoryQueue, Queue, Task, TaskResult};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let queue = Arc::new(MemoryQueue::new());
    let mut engine = Engine::new();

    let mail_queue: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;
    engine.add_func(
        mail_queue,
        "mail",
        |_ctx: CancellationToken, mut task: Task| async move {
            println!("[mail] delivering {}", task.message);
            task.result = TaskResult::succeed();
            task
        },
        2,
        Vec::new(),
    )?;

    let sms_queue: Arc<dyn Queue> = queue.clone() as Arc<dyn Queue>;
    engine.add_func(
        sms_queue,
        "sms",
        |_ctx: CancellationToken, mut task: Task| async move {
            println!("[sms] sending {}", task.message);
            task.result = TaskResult::succeed();
            task
        },
        1,
        Vec::new(),
    )?;

    let ctx = CancellationToken::new();
    for user in ["ada", "grace", "edsger"] {
        engine.enqueue(&ctx, "mail", user, &Vec::new()).await?;
    }
    let alerts = vec!["disk almost full".to_string(), "cert expiring".to_string()];
    engine.batch_enqueue(&ctx, "sms", &alerts, &Vec::new()).await?;

    engine.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    engine.stop();
    engine.wait_stop(Duration::from_secs(5)).await?;

    println!("stats: {:?}", engine.stats());
    Ok(())
}
