//! Error types for submission and task execution.
//!
//! [`PoolError`] surfaces synchronously from [`WorkerPool::submit`] and pool
//! construction. [`TaskError`] surfaces asynchronously inside a
//! [`TaskResult`].
//!
//! [`WorkerPool::submit`]: crate::core::WorkerPool::submit
//! [`TaskResult`]: crate::core::TaskResult

use std::time::Duration;

use thiserror::Error;

/// Errors returned synchronously by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The admission controller had no permit for this submission.
    #[error("admission rejected: rate limit exceeded")]
    AdmissionRejected,
    /// The circuit breaker is open and fast-failing submissions.
    #[error("circuit breaker is open")]
    CircuitOpen,
    /// The queue stayed full for the whole submit timeout.
    #[error("task queue is full")]
    QueueFull,
    /// The pool is draining, stopping, or stopped.
    #[error("pool has been shut down")]
    PoolStopped,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),
}

/// Errors carried by a [`TaskResult`](crate::core::TaskResult).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The executor reported a failure.
    #[error("task execution failed: {message}")]
    Execution {
        /// Failure description from the executor.
        message: String,
        /// Whether another attempt may succeed.
        retryable: bool,
    },
    /// The per-task deadline elapsed before an attempt could succeed.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    /// The circuit breaker rejected the task when a worker picked it up.
    #[error("circuit-open")]
    CircuitOpen,
    /// The task was dequeued by nobody because the pool stopped without draining.
    #[error("task cancelled by pool shutdown")]
    Cancelled,
    /// The executor panicked; the panic was contained.
    #[error("internal fault: {0}")]
    InternalFault(String),
}

impl TaskError {
    /// A failure that may succeed if tried again.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not succeed on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            retryable: false,
        }
    }

    /// Only transient execution errors are retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { retryable: true, .. })
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
