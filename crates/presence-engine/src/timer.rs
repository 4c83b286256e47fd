//! Cancellable delayed-off timer.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// One cancellable delayed action.
///
/// `schedule` atomically supersedes any live timer, so at most one can ever
/// be pending. Cancellation aborts the sleeping task outright; an aborted
/// timer never runs its action and produces no error.
pub struct OffTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OffTimer {
    /// Create an idle timer.
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Schedule `action` to run after `delay`, cancelling any pending
    /// schedule first.
    pub fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        let mut guard = self.handle.lock().unwrap();
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    /// Cancel any pending schedule. Silent when nothing is pending.
    pub fn cancel(&self) {
        if let Some(task) = self.handle.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Whether a schedule is currently pending.
    pub fn is_scheduled(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Default for OffTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OffTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
