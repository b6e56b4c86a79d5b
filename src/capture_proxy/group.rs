//! Join point for background captures

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Counts capture tasks that have not yet written to the table
#[derive(Debug, Default)]
pub struct CaptureGroup {
    active: AtomicUsize,
    idle: Notify,
}

impl CaptureGroup {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a capture; it counts as outstanding until the guard drops
    #[must_use]
    pub fn start(self: &Arc<Self>) -> CaptureGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        CaptureGuard {
            group: Arc::clone(self),
        }
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Wait until no capture is outstanding or `timeout` passes
    ///
    /// Returns the number still outstanding, 0 when the group went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between check and await is not lost
            notified.as_mut().enable();

            let active = self.active();
            if active == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.active();
            }
        }
    }
}

/// Outstanding-capture token
#[derive(Debug)]
pub struct CaptureGuard {
    group: Arc<CaptureGroup>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if self.group.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.group.idle.notify_waiters();
        }
    }
}
