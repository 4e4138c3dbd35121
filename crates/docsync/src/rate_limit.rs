//! Fixed-window rate limiting for destination writes.
//!
//! Capacity replenishes to the full quota on each new one-second window;
//! there is no burst carry-over. A request larger than the whole quota
//! drains capacity across consecutive windows rather than erroring.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

struct Window {
    started_at: Instant,
    used: u32,
}

/// Caps the number of write operations admitted per second.
pub struct WriteRateLimiter {
    quota: u32,
    window: Mutex<Window>,
}

impl WriteRateLimiter {
    /// Limiter admitting `per_second` writes per one-second window.
    /// `per_second` must be non-zero; use [`WriteRateLimiter::from_rate`]
    /// when the value comes from configuration.
    pub fn new(per_second: u32) -> Self {
        Self {
            quota: per_second.max(1),
            window: Mutex::new(Window {
                started_at: Instant::now(),
                used: 0,
            }),
        }
    }

    /// `None` when the configured rate is 0 — call sites treat a missing
    /// limiter as "unlimited, proceed immediately."
    pub fn from_rate(per_second: u32) -> Option<Arc<Self>> {
        if per_second == 0 {
            None
        } else {
            Some(Arc::new(Self::new(per_second)))
        }
    }

    /// Block until `n` units of capacity have been debited.
    pub async fn acquire(&self, n: u32) {
        let mut remaining = n;
        while remaining > 0 {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.started_at) >= WINDOW {
                    window.started_at = now;
                    window.used = 0;
                }

                let available = self.quota - window.used;
                if available > 0 {
                    let take = available.min(remaining);
                    window.used += take;
                    remaining -= take;
                    if remaining == 0 {
                        return;
                    }
                }

                WINDOW.saturating_sub(now.duration_since(window.started_at))
            };

            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
