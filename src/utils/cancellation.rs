//! Cooperative cancellation signal shared by the retry engine (§4.4) and
//! the async polling manager's task coroutines (§4.6). Checked at every
//! suspension point named in §5: between attempts, during backoff sleeps,
//! during a `wait()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `dur` unless cancelled first. Returns `false` if the sleep
    /// was cut short by cancellation, `true` if it ran to completion.
    pub async fn sleep(&self, dur: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(dur) => !self.is_cancelled(),
            () = self.notify.notified() => false,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
