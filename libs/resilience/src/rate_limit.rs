//! Per-identifier token bucket admission control.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use inv_core::InventoryError;
use inv_core::config::env_f64;
use inv_telemetry::counters;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second.
    pub rps: f64,
    /// Bucket capacity.
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 50.0,
            burst: 100.0,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            rps: env_f64("RATE_LIMIT_RPS", 50.0).max(0.1),
            burst: env_f64("RATE_LIMIT_BURST", 100.0).max(1.0),
        }
    }

    fn retry_after_secs(&self) -> u64 {
        (1.0 / self.rps).ceil().max(1.0) as u64
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Token bucket rate limiter keyed by an opaque client identifier.
///
/// State is O(active identifiers); [`RateLimiter::evict_idle`] drops buckets
/// that have not been touched for longer than the given age.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Admits or rejects one request for `id`. Never blocks.
    pub fn check(&self, id: &str) -> Result<(), InventoryError> {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(id.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.config.burst,
                last_refill: now,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refill = elapsed.as_secs_f64() * self.config.rps;
        if refill > 0.0 {
            bucket.tokens = (bucket.tokens + refill).min(self.config.burst);
            bucket.last_refill = now;
        }
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        debug!(id, tokens = bucket.tokens, "rate limit rejection");
        counters::record_counter(counters::RATE_LIMITED, 1);
        Err(InventoryError::RateLimited {
            retry_after_secs: self.config.retry_after_secs(),
        })
    }

    /// Drops buckets idle for longer than `max_idle`. Returns the number
    /// evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= max_idle);
        before - self.buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { rps, burst })
    }

    #[test]
    fn burst_is_consumable_then_rejects() {
        let limiter = limiter(1.0, 3.0);
        assert!(limiter.check("c1").is_ok());
        assert!(limiter.check("c1").is_ok());
        assert!(limiter.check("c1").is_ok());
        let err = limiter.check("c1").unwrap_err();
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.retry_after_secs(), Some(1));
    }

    #[test]
    fn identifiers_have_independent_buckets() {
        let limiter = limiter(1.0, 1.0);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = limiter(1000.0, 1.0);
        assert!(limiter.check("c").is_ok());
        assert!(limiter.check("c").is_err());
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.check("c").is_ok());
    }

    #[test]
    fn retry_after_reflects_slow_rates() {
        let limiter = limiter(0.2, 1.0);
        assert!(limiter.check("slow").is_ok());
        let err = limiter.check("slow").unwrap_err();
        assert_eq!(err.retry_after_secs(), Some(5));
    }

    #[test]
    fn idle_buckets_are_evicted() {
        let limiter = limiter(1.0, 1.0);
        limiter.check("stale").ok();
        assert_eq!(limiter.bucket_count(), 1);
        std::thread::sleep(Duration::from_millis(5));
        let evicted = limiter.evict_idle(Duration::from_millis(1));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.bucket_count(), 0);
    }
}
