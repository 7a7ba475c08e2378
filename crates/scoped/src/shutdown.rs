//! Two-phase shutdown coordination.
//!
//! Phase one stops the acceptor from taking new connections. Phase two starts once the
//! world is unloaded and every connection task has been told to close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Shared shutdown flags, cheap to clone across tasks.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Set once no new connections should be accepted
    initiated: Arc<AtomicBool>,
    /// Set once the world is unloaded and final cleanup can begin
    complete: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            initiated: Arc::new(AtomicBool::new(false)),
            complete: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Stops the acceptor. Calling it twice is harmless.
    pub fn initiate_shutdown(&self) {
        if !self.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new connections will be accepted");
        }
        self.wake.notify_waiters();
    }

    pub fn complete_shutdown(&self) {
        self.complete.store(true, Ordering::Release);
        info!("✅ World unloaded - ready for final cleanup");
    }

    /// Resolves once [`initiate_shutdown`](Self::initiate_shutdown) has been called.
    pub async fn initiated(&self) {
        loop {
            let notified = self.wake.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_progress_in_order() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_initiated());
        state.initiate_shutdown();
        state.initiate_shutdown();
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());
        state.complete_shutdown();
        assert!(state.is_shutdown_complete());
    }

    #[tokio::test]
    async fn waiters_wake_on_initiation() {
        let state = ShutdownState::new();
        let waiter = tokio::spawn({
            let state = state.clone();
            async move { state.initiated().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");

        // Already initiated: resolves immediately.
        state.initiated().await;
    }
}
