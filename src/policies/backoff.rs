//! # Adaptive pull backoff.
//!
//! [`AdaptiveSleep`] is the shared backoff state the producers consult
//! after an empty or failed pull: the current sleep doubles per quiet
//! cycle until it hits the cap, and snaps back to the initial value on
//! the first productive pull.
//!
//! ```text
//! bump: sleepy = 2*sleepy   while 2*sleepy < max
//!       sleepy = max        once the doubling would cross it
//! reset: sleepy = init      (only when it drifted)
//! ```
//!
//! After `N` consecutive quiet cycles the stored value is
//! `min(max, init * 2^N)`. The state is engine-global: all topics share
//! it, so one busy topic keeps the whole engine polling eagerly.
//!
//! Fields are relaxed atomics. Concurrent bumps may lose a doubling step;
//! the value stays inside `[init, max]` either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time;

use crate::policies::jitter::JitterPolicy;

fn to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Doubling backoff with a cap and productive-pull reset.
#[derive(Debug)]
pub struct AdaptiveSleep {
    current: AtomicU64,
    init: AtomicU64,
    max: AtomicU64,
    jitter: JitterPolicy,
}

impl AdaptiveSleep {
    /// Creates backoff state with the given bounds.
    pub fn new(init: Duration, max: Duration, jitter: JitterPolicy) -> Self {
        Self {
            current: AtomicU64::new(to_nanos(init)),
            init: AtomicU64::new(to_nanos(init)),
            max: AtomicU64::new(to_nanos(max)),
            jitter,
        }
    }

    /// Reconfigures the bounds and restarts the schedule at `init`.
    ///
    /// `max` defaults to `init` when omitted.
    pub fn configure(&self, init: Duration, max: Option<Duration>) {
        let init_ns = to_nanos(init);
        self.current.store(init_ns, Ordering::Relaxed);
        self.init.store(init_ns, Ordering::Relaxed);
        self.max
            .store(to_nanos(max.unwrap_or(init)), Ordering::Relaxed);
    }

    /// The stored backoff value right now.
    pub fn current(&self) -> Duration {
        Duration::from_nanos(self.current.load(Ordering::Relaxed))
    }

    /// Advances the schedule one quiet cycle and returns the new value.
    pub fn bump(&self) -> Duration {
        let max = self.max.load(Ordering::Relaxed);
        let cur = self.current.load(Ordering::Relaxed);
        let next = if cur.saturating_mul(2) < max {
            cur.saturating_mul(2)
        } else if cur < max {
            max
        } else {
            cur
        };
        self.current.store(next, Ordering::Relaxed);
        Duration::from_nanos(next)
    }

    /// Bumps the schedule and sleeps for the (possibly jittered) result.
    pub async fn sleep(&self) {
        let delay = self.bump();
        time::sleep(self.jitter.apply(delay)).await;
    }

    /// Snaps the schedule back to `init` after a productive pull.
    pub fn reset(&self) {
        let init = self.init.load(Ordering::Relaxed);
        if self.current.load(Ordering::Relaxed) != init {
            self.current.store(init, Ordering::Relaxed);
        }
    }
}
