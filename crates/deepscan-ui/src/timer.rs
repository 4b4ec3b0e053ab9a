//! Cancellable timer tasks and session staleness tokens.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;

/// Handle to a spawned timer task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Spawns `future` on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime, like [`tokio::spawn`].
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    /// Stops the task. Ticks already running complete; no new tick starts.
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Returns `true` once the task ended on its own or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Monotonic counter identifying the active scan session.
#[derive(Debug, Clone, Default)]
pub struct SessionEpoch {
    current: Arc<AtomicU64>,
}

impl SessionEpoch {
    /// Creates a counter at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new epoch, invalidating every previously issued token.
    pub fn advance(&self) -> EpochToken {
        let value = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        EpochToken {
            current: Arc::clone(&self.current),
            value,
        }
    }

    /// Token for the epoch in force right now.
    pub fn token(&self) -> EpochToken {
        EpochToken {
            current: Arc::clone(&self.current),
            value: self.current.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of one epoch; stale once the epoch advances.
#[derive(Debug, Clone)]
pub struct EpochToken {
    current: Arc<AtomicU64>,
    value: u64,
}

impl EpochToken {
    /// Returns `true` while no newer epoch has started.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.value
    }

    /// Epoch number this token was issued for.
    pub fn value(&self) -> u64 {
        self.value
    }
}
