//! # Global engine configuration.
//!
//! [`Config`] defines the engine's tunables: adaptive sleep bounds, the
//! dispatcher hand-off timer, default per-topic concurrency, the default
//! drain deadline, and the backoff jitter policy.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use topiq::{Config, JitterPolicy};
//!
//! let mut cfg = Config::default();
//! cfg.init_sleepy = Duration::from_millis(10);
//! cfg.max_sleepy = Duration::from_millis(80);
//! cfg.jitter = JitterPolicy::None;
//!
//! assert_eq!(cfg.concurrency, 5);
//! ```

use std::time::Duration;

use crate::policies::JitterPolicy;

/// Configuration for the engine.
///
/// Controls pull backoff, dispatcher hand-off, per-topic pool sizing, and
/// the drain deadline used when [`Engine::wait_stop`](crate::Engine::wait_stop)
/// is called with a zero timeout.
#[derive(Clone, Debug)]
pub struct Config {
    /// Initial (and post-reset) backoff after an empty or failed pull.
    pub init_sleepy: Duration,
    /// Cap for the doubling backoff.
    pub max_sleepy: Duration,
    /// How often a producer blocked on a full pending channel re-checks
    /// the running flags.
    pub timer: Duration,
    /// Per-topic executor pool size used when a worker is registered with
    /// `size == 0`.
    pub concurrency: usize,
    /// Drain deadline used by `wait_stop` when the caller passes zero.
    pub drain: Duration,
    /// Randomization applied to slept backoff durations.
    pub jitter: JitterPolicy,
}

impl Default for Config {
    /// Provides the stock configuration:
    /// - `init_sleepy = 10ms`, `max_sleepy = 10ms` (no growth until tuned)
    /// - `timer = 30ms`
    /// - `concurrency = 5`
    /// - `drain = 10s`
    /// - `jitter = JitterPolicy::None`
    fn default() -> Self {
        Self {
            init_sleepy: Duration::from_millis(10),
            max_sleepy: Duration::from_millis(10),
            timer: Duration::from_millis(30),
            concurrency: 5,
            drain: Duration::from_secs(10),
            jitter: JitterPolicy::None,
        }
    }
}
