//! Circuit breaker gating task execution.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one trial call probes for recovery
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     consecutive failures >= threshold
//! Open     → HalfOpen: cooldown elapsed (on the next allow())
//! HalfOpen → Closed:   trial succeeds
//! HalfOpen → Open:     trial fails; cooldown grows by backoff_factor
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::util::clock::{system_clock, SharedClock};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// A single trial call is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Ticket for one admitted call, handed back to
/// [`CircuitBreaker::record_result`].
///
/// Carries the state generation it was issued in. Results from an earlier
/// generation (a call admitted while closed that finishes after the breaker
/// tripped) no longer affect the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a permit must be handed back to record_result"]
pub struct BreakerPermit {
    generation: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    failure_count: u32,
    opened_at: Option<Instant>,
    cooldown: Duration,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
        self.failure_count = 0;
        self.trial_in_flight = false;
        self.opened_at = (to == CircuitState::Open).then_some(now);
    }

    const fn permit(&self) -> BreakerPermit {
        BreakerPermit {
            generation: self.generation,
        }
    }
}

/// Failure-driven fast-fail gate.
///
/// All transitions happen under one lock, so `allow` and `record_result` are
/// linearizable per instance.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
    backoff_factor: f64,
    inner: Mutex<BreakerInner>,
    clock: SharedClock,
}

impl CircuitBreaker {
    /// Create a closed breaker on the system clock.
    #[must_use]
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create a closed breaker reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: &CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            base_cooldown: config.cooldown,
            max_cooldown: config.max_cooldown.max(config.cooldown),
            backoff_factor: config.backoff_factor.max(1.0),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                failure_count: 0,
                opened_at: None,
                cooldown: config.cooldown,
                trial_in_flight: false,
            }),
            clock,
        }
    }

    /// Ask permission for one call. Rejections are not counted as failures.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and
    /// grants exactly one trial; further calls are rejected until that trial
    /// is recorded.
    pub fn allow(&self) -> Option<BreakerPermit> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(inner.permit()),
            CircuitState::Open => {
                let now = self.clock.now();
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= inner.cooldown);
                if cooled {
                    inner.transition(CircuitState::HalfOpen, now);
                    inner.trial_in_flight = true;
                    info!("circuit breaker half-open, admitting trial call");
                    Some(inner.permit())
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(inner.permit())
                }
            }
        }
    }

    /// Record the outcome of a call that `allow` permitted.
    ///
    /// Only a permit from the current generation counts. While half-open the
    /// sole current permit is the trial's, so only the trial decides the next
    /// state.
    pub fn record_result(&self, permit: BreakerPermit, success: bool) {
        let mut inner = self.inner.lock();
        if permit.generation != inner.generation {
            debug!(state = %inner.state, success = success, "stale breaker result ignored");
            return;
        }
        let now = self.clock.now();
        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.failure_count = 0,
            (CircuitState::Closed, false) => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    let failures = inner.failure_count;
                    inner.cooldown = self.base_cooldown;
                    inner.transition(CircuitState::Open, now);
                    warn!(
                        failures = failures,
                        cooldown_ms = inner.cooldown.as_millis(),
                        "circuit breaker opened"
                    );
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.cooldown = self.base_cooldown;
                inner.transition(CircuitState::Closed, now);
                info!("circuit breaker closed after successful trial");
            }
            (CircuitState::HalfOpen, false) => {
                inner.cooldown = self.next_cooldown(inner.cooldown);
                inner.transition(CircuitState::Open, now);
                warn!(
                    cooldown_ms = inner.cooldown.as_millis(),
                    "circuit breaker trial failed, re-opened"
                );
            }
            // No permits are issued while open.
            (CircuitState::Open, _) => {}
        }
    }

    /// Current state. An open breaker reports `Open` until a call to
    /// [`allow`](Self::allow) observes the elapsed cooldown.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Non-mutating peek: would `allow` reject right now?
    #[must_use]
    pub fn is_rejecting(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => inner.opened_at.is_some_and(|at| {
                self.clock.now().saturating_duration_since(at) < inner.cooldown
            }),
            CircuitState::HalfOpen => inner.trial_in_flight,
        }
    }

    /// Consecutive failures counted while closed.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Cooldown that applies to the current (or next) open period.
    #[must_use]
    pub fn current_cooldown(&self) -> Duration {
        self.inner.lock().cooldown
    }

    fn next_cooldown(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map_or(self.max_cooldown, |next| next.min(self.max_cooldown))
    }
}
