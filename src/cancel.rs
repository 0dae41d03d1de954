//! Cooperative cancellation shared between a build and its caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Shared {
    raised: AtomicBool,
    notify: Notify,
}

/// Flag observed by the runner at step boundaries and by poll loops between
/// iterations. A call already in flight is never interrupted.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<Shared>);

impl CancelFlag {
    /// Creates a flag that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes the request.
    pub fn cancel(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Returns `true` once [`CancelFlag::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised, immediately if it already is.
    pub async fn cancelled(&self) {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a concurrent `cancel` cannot be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::CancelFlag;

    #[tokio::test]
    async fn raised_flag_resolves_immediately() {
        let flag = CancelFlag::new();
        flag.cancel();

        tokio::time::timeout(Duration::from_secs(1), flag.cancelled())
            .await
            .unwrap_or_else(|err| panic!("cancelled should resolve: {err}"));
    }

    #[tokio::test]
    async fn waiter_wakes_when_a_clone_cancels() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;

        flag.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap_or_else(|err| panic!("waiter should wake: {err}"))
            .unwrap_or_else(|err| panic!("waiter task: {err}"));
    }

    #[tokio::test]
    async fn unraised_flag_keeps_waiting() {
        let flag = CancelFlag::new();

        let outcome = tokio::time::timeout(Duration::from_millis(20), flag.cancelled()).await;

        assert!(outcome.is_err());
        assert!(!flag.is_cancelled());
    }
}
