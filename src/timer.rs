//! Fire-once deadlines owned by the entity they guard

use std::fmt;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A cancellable deadline.
///
/// The action is spawned on the runtime and runs once `duration` has
/// elapsed, unless the timer is cancelled or dropped first. A timer that
/// already started firing cannot be recalled, so actions that reach back
/// into shared state should carry the timer's [`key`](Timer::key) and let
/// the receiver discard stale keys.
pub(crate) struct Timer {
    key: u64,
    abort: AbortHandle,
}

impl Timer {
    pub(crate) fn arm<F>(runtime: &Handle, key: u64, duration: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            action();
        });

        Self {
            key,
            abort: task.abort_handle(),
        }
    }

    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    pub(crate) fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("key", &self.key)
            .field("finished", &self.abort.is_finished())
            .finish()
    }
}

/// Hands out timer keys, so a late expiry can be told apart from the
/// current one.
#[derive(Debug, Default)]
pub(crate) struct TimerKeys {
    next: u64,
}

impl TimerKeys {
    pub(crate) fn next(&mut self) -> u64 {
        let key = self.next;
        self.next += 1;
        key
    }
}
