//! # Jitter policy for backoff sleeps.
//!
//! [`JitterPolicy`] randomizes the duration a puller actually sleeps,
//! spreading wake-ups when many topics back off in lockstep against the
//! same quiet backend.
//!
//! - [`JitterPolicy::None`] no randomization, predictable sleeps
//! - [`JitterPolicy::Full`] random sleep in [0, delay]
//! - [`JitterPolicy::Equal`] sleep = delay/2 + random[0, delay/2]
//!
//! Jitter perturbs only the slept duration; the stored backoff state keeps
//! following the deterministic doubling schedule.

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of backoff sleeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Sleep exactly the computed backoff.
    #[default]
    None,
    /// Random sleep in [0, delay]. Maximum spreading.
    Full,
    /// delay/2 + random[0, delay/2]. Spreads wake-ups while preserving
    /// most of the backoff.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }
}

/// Full jitter: random in [0, delay].
fn full_jitter(delay: Duration) -> Duration {
    let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

/// Equal jitter: delay/2 + random[0, delay/2].
fn equal_jitter(delay: Duration) -> Duration {
    let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}
