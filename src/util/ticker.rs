//! Fixed-rate repeating task with an owned cancellation handle

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A callback scheduled at a fixed period on the tokio runtime.
///
/// The callback returns `false` to stop the loop from the inside. `cancel`
/// stops it from the outside; it is idempotent and the task is never
/// rescheduled afterwards. A callback that is already executing on another
/// worker finishes its current run, so owners that need a hard "nothing after
/// cancel" guarantee check their own state under the same lock the callback
/// takes.
pub struct RepeatingTask {
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn the loop. The first invocation happens immediately.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Stop the loop. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
