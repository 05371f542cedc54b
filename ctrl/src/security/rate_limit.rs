//! Per-client token buckets, refilled lazily on access

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity,
            refill_per_sec: config.refill_per_sec,
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `key`
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    /// Take one token for `key` as of `now`. Refill and debit happen under the
    /// bucket's entry lock.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        if now > bucket.last_refill {
            bucket.last_refill = now;
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Forget buckets that have been idle long enough to be full again
    pub fn prune(&self, now: Instant) {
        if self.refill_per_sec <= 0.0 {
            return;
        }
        let Ok(full_after) = Duration::try_from_secs_f64(self.capacity / self.refill_per_sec) else {
            return;
        };
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_refill) < full_after);
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            capacity: 20.0,
            refill_per_sec: 10.0,
        })
    }

    #[test]
    fn test_burst_then_refill() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..20 {
            assert!(limiter.try_acquire_at("10.0.0.5", t0));
        }
        assert!(!limiter.try_acquire_at("10.0.0.5", t0));

        let t1 = t0 + Duration::from_secs(1);
        let admitted = (0..15)
            .filter(|_| limiter.try_acquire_at("10.0.0.5", t1))
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..20 {
            limiter.try_acquire_at("a", t0);
        }
        assert!(!limiter.try_acquire_at("a", t0));
        assert!(limiter.try_acquire_at("b", t0));
    }

    #[test]
    fn test_refill_is_capped() {
        let limiter = limiter();
        let t0 = Instant::now();
        limiter.try_acquire_at("k", t0);
        let later = t0 + Duration::from_secs(3600);
        let admitted = (0..50).filter(|_| limiter.try_acquire_at("k", later)).count();
        assert_eq!(admitted, 20);
    }

    #[test]
    fn test_concurrent_callers_never_exceed_capacity() {
        let limiter = Arc::new(limiter());
        let t0 = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..10).filter(|_| limiter.try_acquire_at("shared", t0)).count()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn test_prune_drops_full_buckets() {
        let limiter = limiter();
        let t0 = Instant::now();
        limiter.try_acquire_at("old", t0);
        limiter.try_acquire_at("new", t0 + Duration::from_secs(5));
        limiter.prune(t0 + Duration::from_secs(5));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_prune_with_unbounded_refill_time_keeps_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: f64::INFINITY,
            refill_per_sec: 1e-300,
        });
        let now = Instant::now();
        assert!(limiter.try_acquire_at("10.0.0.1", now));
        limiter.prune(now + Duration::from_secs(3600));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
