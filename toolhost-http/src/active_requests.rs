//! Tracks in-flight HTTP requests so graceful shutdown can wait for them to
//! drain instead of cutting them off mid-response.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ActiveRequests {
    count: Arc<AtomicUsize>,
}

/// RAII guard: decrements the counter on drop, so a handler that returns
/// early (error, panic-unwind) still releases its slot.
pub struct ActiveRequestGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> ActiveRequestGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActiveRequestGuard { count: Arc::clone(&self.count) }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Polls every 100ms until the set drains or `budget` elapses, whichever
    /// comes first. Returns the count still outstanding when it gave up (0
    /// means a clean drain).
    pub async fn wait_for_drain(&self, budget: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let remaining = self.len();
            if remaining == 0 || tokio::time::Instant::now() >= deadline {
                if remaining > 0 {
                    tracing::warn!(remaining, "forced shutdown with requests still in flight");
                }
                return remaining;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
