//! Per-key token bucket rate limiter (§4.3).
//!
//! Grounded in the teacher's `auth::rate_limit` module: same
//! token-bucket vocabulary (`capacity`, `rate`, violation counting) but
//! simplified to the spec's synchronous, lock-protected map rather than
//! the teacher's pluggable async backend trait — the core has exactly
//! one backend (an in-process map) and never crosses an await point.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill_ns: u64,
}

impl Bucket {
    fn new(rate: f64, capacity: f64) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_refill_ns: 0,
        }
    }

    fn allow(&mut self, now_ns: u64) -> bool {
        let elapsed_ns = now_ns.saturating_sub(self.last_refill_ns);
        let elapsed_s = elapsed_ns as f64 / 1_000_000_000.0;
        self.tokens = (self.tokens + elapsed_s * self.rate).min(self.capacity);
        self.last_refill_ns = now_ns;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A map of token buckets keyed by an arbitrary, hashable key (the
/// spec keys by event type; nothing about the bucket itself assumes
/// that). A key with no bucket registered is unlimited.
pub struct RateLimiterMap<K: Eq + Hash> {
    buckets: Mutex<HashMap<K, Bucket>>,
}

impl<K: Eq + Hash> Default for RateLimiterMap<K> {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> RateLimiterMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a bucket for `key`; a freshly created bucket starts full.
    pub fn set(&self, key: K, rate: f64, burst: f64) {
        let mut guard = self.buckets.lock();
        guard
            .entry(key)
            .and_modify(|b| {
                b.rate = rate;
                b.capacity = burst;
                b.tokens = b.tokens.min(burst);
            })
            .or_insert_with(|| Bucket::new(rate, burst));
    }

    /// Returns `true` if a token was available (and consumes one).
    /// A key with no registered bucket always allows.
    pub fn allow(&self, key: &K, now_ns: u64) -> bool {
        let mut guard = self.buckets.lock();
        match guard.get_mut(key) {
            Some(bucket) => bucket.allow(now_ns),
            None => true,
        }
    }

    pub fn remove(&self, key: &K) {
        self.buckets.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> std::fmt::Debug for RateLimiterMap<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterMap")
            .field("buckets", &self.buckets.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_always_allows() {
        let limiter: RateLimiterMap<u16> = RateLimiterMap::new();
        assert!(limiter.allow(&1, 0));
        assert!(limiter.allow(&1, 1));
    }

    #[test]
    fn burst_then_throttle_then_refill() {
        let limiter: RateLimiterMap<u16> = RateLimiterMap::new();
        limiter.set(1u16, 1.0, 2.0); // 1 token/sec, burst 2

        assert!(limiter.allow(&1, 0));
        assert!(limiter.allow(&1, 0));
        assert!(!limiter.allow(&1, 0), "burst exhausted");

        // one second later, one token refilled
        assert!(limiter.allow(&1, 1_000_000_000));
        assert!(!limiter.allow(&1, 1_000_000_000));
    }

    #[test]
    fn refill_clamps_to_capacity() {
        let limiter: RateLimiterMap<u16> = RateLimiterMap::new();
        limiter.set(1u16, 100.0, 2.0);
        assert!(limiter.allow(&1, 0));
        assert!(limiter.allow(&1, 0));
        // huge elapsed time should not let more than `capacity` worth
        // of tokens accumulate past this call's single consumption
        assert!(limiter.allow(&1, 1_000_000_000_000));
        assert!(limiter.allow(&1, 1_000_000_000_000));
        assert!(!limiter.allow(&1, 1_000_000_000_000));
    }
}
