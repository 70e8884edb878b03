//! Leaky bucket admission controller.
//!
//! A meter that fills by each admitted cost and drains continuously at a
//! fixed rate. Unlike [`TokenBucket`](super::TokenBucket), capacity frees up
//! smoothly rather than in whole-token steps.

use std::time::Instant;

use parking_lot::Mutex;

use super::AdmissionController;
use crate::util::clock::{system_clock, SharedClock};

#[derive(Debug)]
struct MeterState {
    level: f64,
    last_leak: Instant,
}

/// Continuously draining admission meter.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: f64,
    leak_per_second: f64,
    state: Mutex<MeterState>,
    clock: SharedClock,
}

impl LeakyBucket {
    /// Create an empty meter on the system clock.
    #[must_use]
    pub fn new(capacity: u64, leak_per_second: f64) -> Self {
        Self::with_clock(capacity, leak_per_second, system_clock())
    }

    /// Create an empty meter reading time from `clock`.
    #[must_use]
    pub fn with_clock(capacity: u64, leak_per_second: f64, clock: SharedClock) -> Self {
        let now = clock.now();
        #[allow(clippy::cast_precision_loss)]
        let capacity = capacity as f64;
        Self {
            capacity,
            leak_per_second: leak_per_second.max(0.0),
            state: Mutex::new(MeterState {
                level: 0.0,
                last_leak: now,
            }),
            clock,
        }
    }

    /// Current fill level after draining.
    #[must_use]
    pub fn level(&self) -> f64 {
        let mut state = self.state.lock();
        self.leak(&mut state);
        state.level
    }

    fn leak(&self, state: &mut MeterState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_leak);
        state.level = (state.level - elapsed.as_secs_f64() * self.leak_per_second).max(0.0);
        state.last_leak = now;
    }
}

impl AdmissionController for LeakyBucket {
    fn allow(&self, cost: u32) -> bool {
        let cost = f64::from(cost);
        if cost > self.capacity {
            return false;
        }
        let mut state = self.state.lock();
        self.leak(&mut state);
        if state.level + cost <= self.capacity {
            state.level += cost;
            true
        } else {
            false
        }
    }
}
