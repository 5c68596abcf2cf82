//! Backoff policies for the pull loops.

mod backoff;
mod jitter;

pub use backoff::AdaptiveSleep;
pub use jitter::JitterPolicy;
