//! # warden-limits
//!
//! Admission control for the Warden kernel. Before any policy judgment, an
//! action must clear two gates: a per-key token bucket (rate) and a per-key
//! bounded slot counter (concurrency). Both are atomic per key and hold no
//! global locks.

pub mod concurrency;
pub mod ratelimit;

pub use concurrency::{ConcurrencyLimiter, SlotGuard};
pub use ratelimit::{RateDecision, RateLimitConfig, RateLimiter};
