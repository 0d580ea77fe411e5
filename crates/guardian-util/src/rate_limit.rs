//! Request rate limiting

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Token-bucket limiter keyed by caller (IPC client, parent account, ...)
#[derive(Debug)]
pub struct RateLimiter<K> {
    capacity: u32,
    refill_every: Duration,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    refilled_at: Instant,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    /// Allow `max_requests` per `interval` for every key.
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            capacity: max_requests,
            refill_every: interval,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, consuming one token.
    pub fn check(&mut self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &K, now: Instant) -> bool {
        let capacity = self.capacity;
        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: capacity,
            refilled_at: now,
        });

        if now.duration_since(bucket.refilled_at) >= self.refill_every {
            bucket.tokens = capacity;
            bucket.refilled_at = now;
        }

        match bucket.tokens.checked_sub(1) {
            Some(left) => {
                bucket.tokens = left;
                true
            }
            None => false,
        }
    }

    /// Forget a key, e.g. when its connection closes
    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }

    /// Drop buckets untouched for longer than `stale_after`
    pub fn cleanup(&mut self, stale_after: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.refilled_at) < stale_after);
    }

    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}
