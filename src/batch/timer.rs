//! Cancelable delayed tasks for flush scheduling.
//!
//! Flush timers were historically ad hoc timer handles scattered through
//! mutable fields; [`DelayedTask`] makes them an explicit abstraction so
//! cancellation is idempotent and dropping the handle cancels the task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// A future scheduled to run after a delay, cancelable until it starts.
///
/// Cancellation is cooperative: it sets a flag the task checks after its
/// delay, so a task that has already started running is never interrupted
/// mid-flush. A flush taking the timer slots out from under the very
/// timer that triggered it therefore cannot kill its own flush; stale
/// fires are additionally neutralized by the flush epoch check. Dropping
/// the handle cancels the same way.
pub(crate) struct DelayedTask {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DelayedTask {
    pub(crate) fn spawn<F>(delay: Duration, f: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::Acquire) {
                return;
            }
            f.await;
        });
        Self { cancelled, handle }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the task has already run (or exited cancelled). A finished
    /// handle left in a timer slot must not block re-arming.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
