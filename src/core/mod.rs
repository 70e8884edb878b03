//! Core task model, execution, and the worker pool.

pub mod aggregator;
pub mod error;
pub mod executor;
pub mod task;
pub mod worker_pool;

pub use aggregator::ResultAggregator;
pub use error::{AppResult, PoolError, TaskError};
pub use executor::{FnExecutor, TaskExecutor};
pub use task::{SubmitOptions, Task, TaskContext, TaskHandle, TaskMetadata, TaskResult};
pub use worker_pool::{PoolReport, PoolState, PoolStats, WorkerPool, WorkerStats};
