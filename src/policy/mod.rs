//! Admission control, circuit breaking, and retry policies.
//!
//! These are the gates a task passes through on its way to an executor:
//!
//! ```text
//! submit ──▶ AdmissionController::allow ──▶ queue ──▶ CircuitBreaker::allow ──▶ RetryPolicy::execute
//! ```

pub mod circuit_breaker;
pub mod leaky_bucket;
pub mod retry;
pub mod token_bucket;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
pub use leaky_bucket::LeakyBucket;
pub use retry::{RetryOutcome, RetryPolicy};
pub use token_bucket::TokenBucket;

/// Non-blocking admission check performed before a task is queued.
///
/// Implementations must be linearizable: concurrent callers never
/// double-spend capacity.
pub trait AdmissionController: Send + Sync + std::fmt::Debug {
    /// Try to take `cost` permits. Never blocks.
    fn allow(&self, cost: u32) -> bool;
}

/// Admits everything. Used when no rate limit is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl AdmissionController for Unlimited {
    fn allow(&self, _cost: u32) -> bool {
        true
    }
}
