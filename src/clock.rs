//! Time source used by every poll loop.
//!
//! Wait loops never call `Instant::now` or `tokio::time::sleep` directly; they
//! go through a [`Clock`] so tests can substitute a virtual clock and observe
//! timeouts without real delays.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Future returned by [`Clock::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Monotonic time source with an awaitable sleep.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Wall clock backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}
