use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window request counter keyed by client identity.
///
/// Each key's window is updated under its DashMap shard lock, so a hit is
/// atomic per key without a global lock.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, VecDeque<Instant>>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            window,
        }
    }

    /// Records a request and returns how many fall inside the window,
    /// this one included.
    pub fn hit(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_default();
        let hits = entry.value_mut();

        Self::prune(hits, now, self.window);
        hits.push_back(now);
        hits.len()
    }

    /// `true` while `key` stays within `limit` requests per window.
    pub fn check(&self, key: &str, limit: usize) -> bool {
        let count = self.hit(key);
        if count > limit {
            debug!("Rate limit exceeded for {}: {} > {}", key, count, limit);
            return false;
        }
        true
    }

    /// Drops keys with nothing left in their window.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, hits| {
            Self::prune(hits, now, self.window);
            !hits.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }
}
