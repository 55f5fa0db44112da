//! Fixed-window rate limiter shared by request ingress.
//!
//! Windows are keyed by `(client key, window start)`; stale buckets are
//! cleaned opportunistically on the write path so the map stays bounded
//! without a background sweeper.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix second at which the current window resets.
    pub reset_epoch: i64,
}

#[derive(Default)]
pub struct SlidingWindowRateLimiter {
    buckets: Mutex<HashMap<(String, i64), u32>>,
}

impl SlidingWindowRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `key` and decide whether it passes.
    /// `now_epoch` is injected so tests control the clock.
    pub fn check(
        &self,
        key: &str,
        limit: u32,
        window_seconds: i64,
        now_epoch: i64,
    ) -> RateLimitDecision {
        let window_start = now_epoch - now_epoch.rem_euclid(window_seconds);
        let reset_epoch = window_start + window_seconds;

        let mut buckets = self.buckets.lock();

        // Drop windows more than three periods old.
        let stale_before = window_start - window_seconds * 3;
        buckets.retain(|(_, start), _| *start >= stale_before);

        let count = buckets.entry((key.to_owned(), window_start)).or_insert(0);
        if *count >= limit {
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_epoch,
            };
        }
        *count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - *count,
            reset_epoch,
        }
    }
}
