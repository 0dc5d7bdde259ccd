//! Token-bucket rate limiting for script invocations
//!
//! Each key (a caller id, or `script:<id>` by default) owns an independent
//! bucket created on first use. Refill is computed lazily from the wall-clock
//! time elapsed since the bucket was last touched.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::errors::SafeLock;

/// Admission check consulted before any other step of an invocation.
pub trait RateLimiter: Send + Sync {
    /// Take one token for `key`. `false` means the caller is throttled.
    fn consume(&self, key: &str) -> bool;
}

/// Bucket sizing shared by every key of a limiter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens a bucket holds.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_second: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens =
                (self.tokens + elapsed * config.refill_per_second).min(f64::from(config.capacity));
            self.last_refill = now;
        }
    }
}

/// In-memory token bucket limiter.
///
/// A single mutex guards bucket creation, refill and consumption, so two
/// concurrent calls on the same key never both spend the same token.
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume against an explicit instant. Instants earlier than a bucket's
    /// last refill add no tokens.
    pub fn consume_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = match self.buckets.safe_lock("rate_limiter") {
            Ok(guard) => guard,
            Err(e) => {
                error!(key = %key, error = %e, "Rate limiter unavailable, denying request");
                return false;
            }
        };

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(self.config.capacity, now));
        bucket.refill(&self.config, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            debug!(key = %key, tokens = bucket.tokens, "Rate limit exceeded");
            false
        }
    }

    /// Tokens currently available for `key`, without consuming.
    pub fn available(&self, key: &str) -> f64 {
        let now = Instant::now();
        match self.buckets.safe_lock("rate_limiter") {
            Ok(buckets) => match buckets.get(key) {
                Some(bucket) => {
                    let mut refilled = bucket.clone();
                    refilled.refill(&self.config, now);
                    refilled.tokens
                }
                None => f64::from(self.config.capacity),
            },
            Err(_) => 0.0,
        }
    }

    /// Get rate limiter statistics
    pub fn stats(&self) -> RateLimiterStats {
        let tracked_keys = self
            .buckets
            .safe_lock("rate_limiter")
            .map(|buckets| buckets.len())
            .unwrap_or(0);

        RateLimiterStats {
            tracked_keys,
            capacity: self.config.capacity,
            refill_per_second: self.config.refill_per_second,
        }
    }
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn consume(&self, key: &str) -> bool {
        self.consume_at(key, Instant::now())
    }
}

/// Statistics for the rate limiter
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub tracked_keys: usize,
    pub capacity: u32,
    pub refill_per_second: f64,
}
