//! Per-key token-bucket rate limiter.
//!
//! Each admission key (typically `actor:action_kind`) gets an independent
//! bucket with a base capacity, a burst allowance on top, and continuous
//! refill. A failed consume leaves the bucket unchanged apart from the refill
//! — there is no partial consumption.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base bucket capacity in tokens.
    pub base: u32,
    /// Extra burst allowance on top of the base capacity.
    pub burst: u32,
    /// Tokens refilled per second.
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    /// The bucket ceiling: base capacity plus burst allowance.
    pub fn capacity(&self) -> f64 {
        f64::from(self.base) + f64::from(self.burst)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base: 30,
            burst: 10,
            refill_per_sec: 5.0,
        }
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Tokens left in the bucket after this call.
    pub remaining: f64,
    /// Milliseconds until enough tokens exist for the requested cost.
    /// Zero when allowed.
    pub retry_after_ms: u64,
}

/// A token bucket for a single key.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time, then try to consume `cost`.
    fn try_consume(&mut self, cost: f64, config: &RateLimitConfig, now: Instant) -> RateDecision {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity());
        self.last_refill = now;

        if self.tokens >= cost {
            self.tokens -= cost;
            RateDecision {
                allowed: true,
                remaining: self.tokens,
                retry_after_ms: 0,
            }
        } else {
            RateDecision {
                allowed: false,
                remaining: self.tokens,
                retry_after_ms: self.retry_after_ms(cost, config.refill_per_sec),
            }
        }
    }

    /// Milliseconds until `cost` tokens are available.
    fn retry_after_ms(&self, cost: f64, refill_per_sec: f64) -> u64 {
        if refill_per_sec <= 0.0 {
            return 60_000;
        }
        let needed = cost - self.tokens;
        ((needed / refill_per_sec) * 1000.0).ceil().max(1.0) as u64
    }
}

/// Shared per-key token buckets. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Try to consume `cost` tokens for the given key.
    pub fn try_consume(&self, key: &str, cost: u32) -> RateDecision {
        self.try_consume_at(key, cost, Instant::now())
    }

    /// Clock-injected form of [`try_consume`](Self::try_consume); `now` must
    /// be monotonically non-decreasing per key.
    pub fn try_consume_at(&self, key: &str, cost: u32, now: Instant) -> RateDecision {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.config.capacity(), now));
        let decision = entry.try_consume(f64::from(cost), &self.config, now);
        if !decision.allowed {
            warn!(
                key,
                cost,
                retry_after_ms = decision.retry_after_ms,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Refill one key's bucket to capacity. Operational recovery hook.
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Drop all buckets, refilling everything to capacity.
    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// Number of keys with live buckets.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
