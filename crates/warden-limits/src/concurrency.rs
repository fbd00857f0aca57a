//! Per-key bounded concurrency slots.
//!
//! `try_acquire` hands back a [`SlotGuard`] that releases its slot on drop, so
//! the slot is returned on every exit path — success, error, or cancellation —
//! without relying on caller discipline.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Shared per-key slot counters. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    counters: Arc<DashMap<String, Arc<AtomicU32>>>,
    max: u32,
}

impl ConcurrencyLimiter {
    pub fn new(max: u32) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            max,
        }
    }

    /// Try to claim a slot for the given key. Returns `None` when all slots
    /// for the key are in use; the counter is left untouched in that case.
    pub fn try_acquire(&self, key: &str) -> Option<SlotGuard> {
        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone();

        let max = self.max;
        let claimed = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current < max { Some(current + 1) } else { None }
            })
            .is_ok();

        if claimed {
            Some(SlotGuard { counter })
        } else {
            warn!(key, max, "concurrency limit reached");
            None
        }
    }

    /// Number of slots currently held for a key.
    pub fn active(&self, key: &str) -> u32 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Maximum slots per key.
    pub fn max(&self) -> u32 {
        self.max
    }
}

/// A held concurrency slot. Dropping it releases the slot.
pub struct SlotGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Never drive the counter below zero, even on a stray double-release.
        let _ = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
    }
}
