//! Per-call cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{OrmError, Result};

#[derive(Debug, Default)]
struct Signal {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancel flag plus an optional deadline, attachable to a session.
///
/// Clones share the flag: cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signal: Arc<Signal>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never expires on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            signal: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Cancels every operation running under this context.
    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    /// Whether the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.signal.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.signal.notify.notified();
            if self.signal.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Runs `fut` unless the context ends first; the future is dropped on
    /// cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cancelled`] when the context ends first, or the
    /// future's own error.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_done() {
            return Err(OrmError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(OrmError::Cancelled),
            () = self.expired() => Err(OrmError::Cancelled),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_future() {
        let ctx = Context::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        let result: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(result, Err(OrmError::Cancelled)));
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_deadline() {
        let ctx = Context::with_timeout(Duration::from_millis(5));
        let result: Result<()> = ctx.run(std::future::pending()).await;
        assert!(matches!(result, Err(OrmError::Cancelled)));
    }
}
