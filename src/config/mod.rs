//! Configuration models for pools, admission control, breaking, and retries.

pub mod pool;

pub use pool::{CircuitBreakerConfig, PoolConfig, RateLimitConfig, RetryConfig, DEFAULT_STACK_SIZE};
