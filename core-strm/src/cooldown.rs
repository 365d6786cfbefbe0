//! Fixed minimum spacing between successive remote calls

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a fixed interval between calls to one rate-limited endpoint.
///
/// Callers queue on the internal lock, so concurrent users are serialized and
/// every call is spaced at least `interval` after the previous one.
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed and claim the slot
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
