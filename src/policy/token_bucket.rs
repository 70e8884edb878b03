//! Token bucket admission controller.
//!
//! Tokens refill lazily on each call: elapsed time since the last refill is
//! converted into whole tokens, capped at capacity. No background timer.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::AdmissionController;
use crate::config::RateLimitConfig;
use crate::util::clock::{system_clock, SharedClock};

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Capped, lazily refilled permit counter.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
    clock: SharedClock,
}

impl TokenBucket {
    /// Create a full bucket on the system clock.
    #[must_use]
    pub fn new(capacity: u64, refill_per_second: f64) -> Self {
        Self::with_clock(capacity, refill_per_second, system_clock())
    }

    /// Create a full bucket reading time from `clock`.
    #[must_use]
    pub fn with_clock(capacity: u64, refill_per_second: f64, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            capacity,
            refill_per_second: refill_per_second.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_second)
    }

    /// Maximum number of tokens.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Refill rate.
    #[must_use]
    pub const fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Tokens available right now, after refilling.
    #[must_use]
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Try to take `cost` tokens.
    ///
    /// Refill and decrement happen under one lock so concurrent callers never
    /// count the same elapsed time twice.
    pub fn try_acquire(&self, cost: u64) -> bool {
        if cost > self.capacity {
            return false;
        }
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        if state.tokens >= self.capacity {
            state.last_refill = now;
            return;
        }
        if now < state.last_refill {
            // Backward jump: zero elapsed, re-baseline.
            state.last_refill = now;
            return;
        }
        let elapsed = now - state.last_refill;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let earned = (elapsed.as_secs_f64() * self.refill_per_second).floor() as u64;
        if earned == 0 {
            return;
        }
        let missing = self.capacity - state.tokens;
        if earned >= missing {
            state.tokens = self.capacity;
            state.last_refill = now;
        } else {
            state.tokens += earned;
            // Keep the fractional remainder for the next call.
            #[allow(clippy::cast_precision_loss)]
            let spent = Duration::from_secs_f64(earned as f64 / self.refill_per_second);
            state.last_refill += spent;
        }
    }
}

impl AdmissionController for TokenBucket {
    fn allow(&self, cost: u32) -> bool {
        self.try_acquire(u64::from(cost))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::util::clock::ManualClock;

    fn bucket(capacity: u64, rate: f64) -> (TokenBucket, ManualClock) {
        let clock = ManualClock::new();
        let bucket = TokenBucket::with_clock(capacity, rate, Arc::new(clock.clone()));
        (bucket, clock)
    }

    #[test]
    fn test_burst_then_reject() {
        let (bucket, _clock) = bucket(5, 2.0);
        let admitted: Vec<bool> = (0..15).map(|_| bucket.allow(1)).collect();
        assert!(admitted[..5].iter().all(|ok| *ok));
        assert!(admitted[5..].iter().all(|ok| !*ok));
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_refill_floors_and_keeps_remainder() {
        let (bucket, clock) = bucket(5, 2.0);
        for _ in 0..5 {
            assert!(bucket.allow(1));
        }

        // 0.4s * 2/s = 0.8 tokens -> floor 0
        clock.advance(Duration::from_millis(400));
        assert!(!bucket.allow(1));

        // another 0.2s completes the first token
        clock.advance(Duration::from_millis(200));
        assert!(bucket.allow(1));
        assert!(!bucket.allow(1));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let (bucket, clock) = bucket(3, 10.0);
        assert!(bucket.allow(3));
        clock.advance(Duration::from_secs(60));
        assert_eq!(bucket.available(), 3);
    }

    #[test]
    fn test_cost_above_capacity_rejected() {
        let (bucket, _clock) = bucket(4, 1.0);
        assert!(!bucket.allow(5));
        assert_eq!(bucket.available(), 4);
        assert!(bucket.allow(4));
    }

    #[test]
    fn test_backward_clock_is_zero_elapsed() {
        let (bucket, clock) = bucket(2, 1.0);
        assert!(bucket.allow(2));
        clock.rewind(Duration::from_secs(10));
        assert!(!bucket.allow(1));
        // Recovery is measured from the rewound instant.
        clock.advance(Duration::from_secs(1));
        assert!(bucket.allow(1));
    }

    #[test]
    fn test_zero_refill_never_recovers() {
        let (bucket, clock) = bucket(1, 0.0);
        assert!(bucket.allow(1));
        clock.advance(Duration::from_secs(3600));
        assert!(!bucket.allow(1));
    }

    #[test]
    fn test_concurrent_callers_never_overdraw() {
        let bucket = Arc::new(TokenBucket::new(100, 0.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                std::thread::spawn(move || (0..50).filter(|_| bucket.allow(1)).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(bucket.available(), 0);
    }
}
