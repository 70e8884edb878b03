//! Pool configuration structures.
//!
//! Durations are serialized as integer milliseconds (`*_ms` keys). Every
//! section has defaults, so partial JSON documents are accepted.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::util::serde::{duration_ms, option_duration_ms};

/// Default worker thread stack size (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size.
    pub capacity: u64,
    /// Tokens added per second.
    pub refill_per_second: f64,
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting a trial.
    #[serde(rename = "cooldown_ms", with = "duration_ms")]
    pub cooldown: Duration,
    /// Cooldown multiplier applied after each failed trial.
    pub backoff_factor: f64,
    /// Upper bound for the grown cooldown.
    #[serde(rename = "max_cooldown_ms", with = "duration_ms")]
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_cooldown: Duration::from_secs(60),
        }
    }
}

/// Retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per task, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Backoff cap.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Backoff multiplier per retry.
    pub backoff_factor: f64,
    /// Wall-clock budget across all attempts of one task.
    #[serde(rename = "per_task_deadline_ms", with = "option_duration_ms")]
    pub per_task_deadline: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            per_task_deadline: None,
        }
    }
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Queued tasks allowed before submitters block. Zero means direct
    /// hand-off to an idle worker.
    pub queue_capacity: usize,
    /// Finished results buffered before workers block.
    pub result_capacity: usize,
    /// Admission rate limit; `None` admits everything.
    pub rate_limit: Option<RateLimitConfig>,
    /// Circuit breaker parameters.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry parameters.
    pub retry: RetryConfig,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            queue_capacity: 1024,
            result_capacity: 1024,
            rate_limit: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl PoolConfig {
    /// Defaults: one worker per CPU, 1024-deep queue and result buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the result buffer capacity.
    #[must_use]
    pub const fn with_result_capacity(mut self, result_capacity: usize) -> Self {
        self.result_capacity = result_capacity;
        self
    }

    /// Enable token bucket admission control.
    #[must_use]
    pub const fn with_rate_limit(mut self, capacity: u64, refill_per_second: f64) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            capacity,
            refill_per_second,
        });
        self
    }

    /// Replace the circuit breaker parameters.
    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Replace the retry parameters.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.result_capacity == 0 {
            return Err("result_capacity must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if let Some(rate) = &self.rate_limit {
            if rate.capacity == 0 {
                return Err("rate_limit.capacity must be greater than 0".into());
            }
            if !rate.refill_per_second.is_finite() || rate.refill_per_second < 0.0 {
                return Err("rate_limit.refill_per_second must be a non-negative number".into());
            }
        }
        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err("circuit_breaker.failure_threshold must be greater than 0".into());
        }
        if !breaker.backoff_factor.is_finite() || breaker.backoff_factor < 1.0 {
            return Err("circuit_breaker.backoff_factor must be at least 1.0".into());
        }
        if breaker.max_cooldown < breaker.cooldown {
            return Err("circuit_breaker.max_cooldown_ms must not be below cooldown_ms".into());
        }
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".into());
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return Err("retry.backoff_factor must be at least 1.0".into());
        }
        if retry.max_delay < retry.initial_delay {
            return Err("retry.max_delay_ms must not be below initial_delay_ms".into());
        }
        if retry.per_task_deadline.is_some_and(|d| d.is_zero()) {
            return Err("retry.per_task_deadline_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `ENGINE_*` environment variables over the
    /// defaults, reading a `.env` file first if one exists.
    ///
    /// Recognized variables: `ENGINE_WORKER_COUNT`, `ENGINE_QUEUE_CAPACITY`,
    /// `ENGINE_RESULT_CAPACITY`, `ENGINE_RATE_LIMIT_CAPACITY`,
    /// `ENGINE_RATE_LIMIT_REFILL_PER_SECOND`,
    /// `ENGINE_BREAKER_FAILURE_THRESHOLD`, `ENGINE_BREAKER_COOLDOWN_MS`,
    /// `ENGINE_BREAKER_BACKOFF_FACTOR`, `ENGINE_BREAKER_MAX_COOLDOWN_MS`,
    /// `ENGINE_RETRY_MAX_ATTEMPTS`, `ENGINE_RETRY_INITIAL_DELAY_MS`,
    /// `ENGINE_RETRY_MAX_DELAY_MS`, `ENGINE_RETRY_BACKOFF_FACTOR`,
    /// `ENGINE_RETRY_PER_TASK_DEADLINE_MS`.
    ///
    /// # Errors
    ///
    /// Fails if a variable does not parse or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    ///
    /// # Errors
    ///
    /// Fails if a variable does not parse or the result does not validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();

        if let Some(v) = parse_var(&lookup, "ENGINE_WORKER_COUNT")? {
            cfg.worker_count = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_QUEUE_CAPACITY")? {
            cfg.queue_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_RESULT_CAPACITY")? {
            cfg.result_capacity = v;
        }

        let rate_capacity: Option<u64> = parse_var(&lookup, "ENGINE_RATE_LIMIT_CAPACITY")?;
        let rate_refill: Option<f64> = parse_var(&lookup, "ENGINE_RATE_LIMIT_REFILL_PER_SECOND")?;
        match (rate_capacity, rate_refill) {
            (Some(capacity), refill) => {
                cfg.rate_limit = Some(RateLimitConfig {
                    capacity,
                    refill_per_second: refill.unwrap_or(0.0),
                });
            }
            (None, Some(_)) => {
                anyhow::bail!("ENGINE_RATE_LIMIT_REFILL_PER_SECOND requires ENGINE_RATE_LIMIT_CAPACITY");
            }
            (None, None) => {}
        }

        if let Some(v) = parse_var(&lookup, "ENGINE_BREAKER_FAILURE_THRESHOLD")? {
            cfg.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_BREAKER_COOLDOWN_MS")? {
            cfg.circuit_breaker.cooldown = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_BREAKER_BACKOFF_FACTOR")? {
            cfg.circuit_breaker.backoff_factor = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_BREAKER_MAX_COOLDOWN_MS")? {
            cfg.circuit_breaker.max_cooldown = Duration::from_millis(v);
        }

        if let Some(v) = parse_var(&lookup, "ENGINE_RETRY_MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_RETRY_INITIAL_DELAY_MS")? {
            cfg.retry.initial_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_RETRY_MAX_DELAY_MS")? {
            cfg.retry.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_RETRY_BACKOFF_FACTOR")? {
            cfg.retry.backoff_factor = v;
        }
        if let Some(v) = parse_var(&lookup, "ENGINE_RETRY_PER_TASK_DEADLINE_MS")? {
            cfg.retry.per_task_deadline = Some(Duration::from_millis(v));
        }

        cfg.validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration from environment: {e}"))?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("failed to parse {key}={raw:?}"))
        })
        .transpose()
}
