//! Fixed-window rate limiter (§3 "Rate-Limit Bucket", §4.1 "Rate limiter").
//!
//! Deliberately not the token-bucket `governor` crate used elsewhere in the
//! examples pack: spec.md's semantics are a literal fixed window with a
//! hard reset, not a continuously-replenishing bucket, and the window size
//! is derived from the key's scope prefix rather than being uniform. Built
//! on `dashmap` (attested for exactly this kind of keyed concurrent counter
//! in the gateway-shaped repos of the pack) with a `moka` idle-TTL cache on
//! top for bucket eviction.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One window's worth of state for a single key. `window_start` is stored
/// as Unix millis so the whole thing can live behind atomics rather than a
/// lock — `acquire` only ever does a compare-and-reset, never blocks.
struct Bucket {
    window_start_millis: AtomicI64,
    count: AtomicU32,
    max_per_window: u32,
    window: Duration,
}

impl Bucket {
    fn new(max_per_window: u32, window: Duration, now_millis: i64) -> Self {
        Self {
            window_start_millis: AtomicI64::new(now_millis),
            count: AtomicU32::new(0),
            max_per_window,
            window,
        }
    }

    /// Returns `true` if the caller may proceed. A zero limit denies every
    /// request unconditionally (§8 boundary behavior).
    fn acquire(&self, now_millis: i64) -> bool {
        if self.max_per_window == 0 {
            return false;
        }

        let window_millis = self.window.as_millis() as i64;
        let start = self.window_start_millis.load(Ordering::Acquire);
        if now_millis.saturating_sub(start) >= window_millis {
            // Window elapsed: reset atomically. Two concurrent callers may
            // both observe the reset near the boundary (§5 "accepted:
            // over-allow by at most one window worth").
            self.window_start_millis.store(now_millis, Ordering::Release);
            self.count.store(0, Ordering::Release);
        }

        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        count <= self.max_per_window
    }
}

/// Which fixed window applies, derived purely from the key's scope prefix
/// (§4.1: `ip:`/`user:` are 1-minute windows, `global:` is 1-second).
fn window_for_key(key: &str) -> Duration {
    if key.starts_with("global:") {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(60)
    }
}

/// Scoped rate limiter: one bucket per key, evicted after an idle TTL.
pub struct RateLimiter {
    buckets: moka::future::Cache<String, Arc<Bucket>>,
    ip_limit: u32,
    user_limit: u32,
    global_limit: u32,
}

impl RateLimiter {
    pub fn new(ip_limit: u32, user_limit: u32, global_limit: u32, capacity: u64) -> Self {
        let buckets = moka::future::Cache::builder()
            .max_capacity(capacity)
            .time_to_idle(Duration::from_secs(120)) // §4.1: 2-minute idle TTL
            .build();
        Self { buckets, ip_limit, user_limit, global_limit }
    }

    fn limit_for(&self, key: &str) -> u32 {
        if key.starts_with("ip:") {
            self.ip_limit
        } else if key.starts_with("user:") {
            self.user_limit
        } else {
            self.global_limit
        }
    }

    /// Checks and increments the bucket for `key`, returning whether the
    /// request may proceed.
    pub async fn is_allowed(&self, key: &str) -> bool {
        let now_millis = chrono::Utc::now().timestamp_millis();
        let limit = self.limit_for(key);
        let window = window_for_key(key);

        let bucket = self
            .buckets
            .get_with(key.to_string(), async { Arc::new(Bucket::new(limit, window, now_millis)) })
            .await;

        bucket.acquire(now_millis)
    }

    pub async fn entry_count(&self) -> u64 {
        self.buckets.run_pending_tasks().await;
        self.buckets.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_limit_denies_every_request() {
        let limiter = RateLimiter::new(0, 0, 0, 100);
        assert!(!limiter.is_allowed("ip:1.2.3.4").await);
        assert!(!limiter.is_allowed("ip:1.2.3.4").await);
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(3, 3, 3, 100);
        assert!(limiter.is_allowed("ip:1.2.3.4").await);
        assert!(limiter.is_allowed("ip:1.2.3.4").await);
        assert!(limiter.is_allowed("ip:1.2.3.4").await);
        assert!(!limiter.is_allowed("ip:1.2.3.4").await);
    }

    #[tokio::test]
    async fn separate_keys_get_separate_buckets() {
        let limiter = RateLimiter::new(1, 1, 1, 100);
        assert!(limiter.is_allowed("ip:1.2.3.4").await);
        assert!(limiter.is_allowed("ip:5.6.7.8").await);
        assert!(!limiter.is_allowed("ip:1.2.3.4").await);
    }

    #[tokio::test]
    async fn user_scope_is_independent_of_ip_scope() {
        let limiter = RateLimiter::new(1, 5, 5, 100);
        assert!(limiter.is_allowed("ip:1.2.3.4").await);
        assert!(!limiter.is_allowed("ip:1.2.3.4").await);
        assert!(limiter.is_allowed("user:alice").await);
    }

    #[test]
    fn window_selection_matches_prefix() {
        assert_eq!(window_for_key("global:all"), Duration::from_secs(1));
        assert_eq!(window_for_key("ip:1.2.3.4"), Duration::from_secs(60));
        assert_eq!(window_for_key("user:alice"), Duration::from_secs(60));
    }
}
