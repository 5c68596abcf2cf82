//! # In-flight execution gauge.
//!
//! [`InFlight`] counts handlers currently executing across all topics and
//! is the single synchronization point between executor slots and
//! [`Engine::wait_stop`](crate::Engine::wait_stop). Executors hold an RAII
//! [`InFlightGuard`] for the duration of one task; the guard decrements on
//! drop, so the count stays correct even when the slot unwinds.
//!
//! `wait()` registers for notification **before** re-checking the count,
//! so a decrement racing with the check cannot be missed.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Gauge of currently executing handlers.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    /// Registers one executing handler; the returned guard releases it.
    pub(crate) fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard { gauge: self }
    }

    /// Handlers executing right now.
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resolves once the gauge reads zero.
    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII handle for one executing handler.
pub(crate) struct InFlightGuard<'a> {
    gauge: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.gauge.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gauge.notify.notify_waiters();
        }
    }
}
