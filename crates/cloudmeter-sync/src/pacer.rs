//! Process-wide request pacing

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Minimum gap between two requests to the cloud API
pub const DEFAULT_SPACING: Duration = Duration::from_secs(2);

/// Enforces a minimum spacing between consecutive requests
///
/// The timestamp lock is held while sleeping, so concurrent callers queue
/// up behind each other and each one observes the previous caller's slot.
#[derive(Debug)]
pub struct Pacer {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait for the next free slot and claim it
    ///
    /// Returns the instant the slot was claimed.
    pub async fn wait(&self) -> Instant {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.spacing;
            if ready_at > Instant::now() {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Pacing request");
                sleep_until(ready_at).await;
            }
        }
        let now = Instant::now();
        *last = Some(now);
        now
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_SPACING)
    }
}
