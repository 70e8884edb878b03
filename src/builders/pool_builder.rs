//! Builder to assemble a worker pool from configuration plus optional
//! custom admission, breaker, and clock.

use std::fmt;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::core::{AppResult, PoolError, TaskExecutor, WorkerPool};
use crate::policy::{AdmissionController, CircuitBreaker, TokenBucket, Unlimited};
use crate::util::clock::{system_clock, SharedClock};

/// Assemble a [`WorkerPool`].
///
/// Anything not set explicitly is derived from the [`PoolConfig`]: a token
/// bucket when `rate_limit` is set, and a breaker from `circuit_breaker`.
/// Both read time from the builder's clock.
///
/// ```rust,ignore
/// let pool = PoolBuilder::new(PoolConfig::new().with_worker_count(2))
///     .with_admission(Arc::new(LeakyBucket::new(100, 50.0)))
///     .build(executor)?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
    admission: Option<Arc<dyn AdmissionController>>,
    breaker: Option<Arc<CircuitBreaker>>,
    clock: SharedClock,
}

impl PoolBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            admission: None,
            breaker: None,
            clock: system_clock(),
        }
    }

    /// Start from `ENGINE_*` environment variables (and `.env`).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new(PoolConfig::from_env()?))
    }

    /// Configuration the pool will be built with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Use a custom admission controller instead of the configured rate limit.
    #[must_use]
    pub fn with_admission(mut self, admission: Arc<dyn AdmissionController>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Share an existing circuit breaker, e.g. across pools calling the
    /// same dependency.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Clock for policies derived from configuration.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the pool and start its workers.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build<P, O, E>(self, executor: E) -> Result<WorkerPool<P, O, E>, PoolError>
    where
        P: Send + Sync + 'static,
        O: Send + 'static,
        E: TaskExecutor<P, O>,
    {
        let admission: Arc<dyn AdmissionController> = match (self.admission, &self.config.rate_limit) {
            (Some(admission), _) => admission,
            (None, Some(rate)) => Arc::new(TokenBucket::with_clock(
                rate.capacity,
                rate.refill_per_second,
                Arc::clone(&self.clock),
            )),
            (None, None) => Arc::new(Unlimited),
        };
        let breaker = self.breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::with_clock(
                &self.config.circuit_breaker,
                Arc::clone(&self.clock),
            ))
        });
        WorkerPool::with_components(self.config, executor, admission, breaker)
    }
}

impl fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("config", &self.config)
            .field("admission", &self.admission)
            .field("custom_breaker", &self.breaker.is_some())
            .finish_non_exhaustive()
    }
}
