//! Wakes the dispatcher loop when work is enqueued, so it does not spin
//! polling the repository. Ordering itself is delegated to
//! [`crate::request::IntegrationRepository::find_due`], which sorts by
//! (priority, created_at) as the queue contract requires.

use tokio::sync::Notify;
use tokio::time::Duration;

pub struct QueueSignal {
    notify: Notify,
}

impl Default for QueueSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSignal {
    pub fn new() -> Self {
        Self { notify: Notify::new() }
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Waits up to `timeout` for a wake signal, so the dispatcher loop can
    /// poll for due work and still shut down cleanly between wakeups.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}
