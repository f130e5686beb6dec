use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window upload quota keyed by client identity.
///
/// Each key owns one window; the shard lock taken by `DashMap::entry`
/// makes check-and-increment atomic per key, and different keys never
/// contend beyond sharing a shard.
#[derive(Debug)]
pub struct UploadRateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl UploadRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts one request for `key`.
    ///
    /// Returns the requests left in the current window, or the time until
    /// the window resets when the quota is used up.
    pub fn check(&self, key: &str) -> Result<u32, Duration> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<u32, Duration> {
        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            Ok(self.max_requests - entry.count)
        } else {
            Err(entry.reset_at.saturating_duration_since(now))
        }
    }

    /// Drops windows that have already reset. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
