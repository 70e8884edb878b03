//! Worker pool with dedicated worker threads.
//!
//! This module provides a [`WorkerPool`] that runs submitted tasks on a fixed
//! set of OS threads. Each thread has its own single-threaded tokio runtime so
//! async executors, retry backoff, and attempt timeouts work without touching
//! the caller's runtime.
//!
//! # Key Features
//!
//! - **Admission control**: token bucket (or any [`AdmissionController`]) before queueing
//! - **Backpressure**: bounded queue blocks submitters; bounded result channel blocks workers
//! - **Fault isolation**: circuit breaker, retries, and caught panics per task
//! - **Structured shutdown**: drain or abandon, then join every worker
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::PoolConfig;
//! use prometheus_task_engine::core::{SubmitOptions, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::new().with_worker_count(4), my_executor)?;
//! let results = pool.results();
//!
//! pool.submit(job, SubmitOptions::new())?;
//! pool.shutdown(true);
//!
//! for result in results {
//!     println!("{} -> {:?}", result.task_id, result.outcome);
//! }
//! ```
//!
//! [`AdmissionController`]: crate::policy::AdmissionController

mod pool;
mod worker;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::policy::CircuitState;

pub use pool::WorkerPool;

/// Lifecycle of a pool.
///
/// ```text
/// Running ─▶ Draining ─▶ Stopped   (shutdown(drain = true))
/// Running ─▶ Stopping ─▶ Stopped   (shutdown(drain = false))
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// Finishing queued and in-flight tasks.
    Draining,
    /// Finishing in-flight tasks; queued tasks are abandoned.
    Stopping,
    /// All workers exited.
    Stopped,
}

impl PoolState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time statistics about the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Lifecycle state.
    pub pool_state: PoolState,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Tasks a worker is currently executing.
    pub in_flight: u64,
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks a worker finished, successfully or not.
    pub completed: u64,
    /// Finished tasks whose outcome was an error.
    pub failed: u64,
    /// Submissions turned away for any reason.
    pub rejected: u64,
    /// Circuit breaker state.
    pub circuit_state: CircuitState,
}

/// Live counters shared by the pool and its workers (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub in_flight: AtomicU64,
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
}

impl PoolCounters {
    /// Snapshot the counters into a stats value.
    pub fn snapshot(
        &self,
        worker_count: usize,
        pool_state: PoolState,
        queued: usize,
        circuit_state: CircuitState,
    ) -> PoolStats {
        PoolStats {
            worker_count,
            pool_state,
            queued,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            circuit_state,
        }
    }
}

/// Statistics one worker accumulates locally and hands back when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Worker index; meaningless on merged totals.
    pub worker_id: usize,
    /// Tasks dequeued.
    pub executed: u64,
    /// Tasks that produced an output.
    pub succeeded: u64,
    /// Tasks that ended in an error, including circuit rejections.
    pub failed: u64,
    /// Tasks rejected by the circuit breaker.
    pub circuit_rejected: u64,
    /// Extra attempts beyond the first.
    pub retries: u64,
    /// Panics caught during execution.
    pub panics: u64,
    /// Time spent running tasks.
    pub busy: Duration,
}

impl WorkerStats {
    pub(crate) fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Self::default()
        }
    }

    /// Add another worker's counts into this one.
    pub fn merge(&mut self, other: &Self) {
        self.executed += other.executed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.circuit_rejected += other.circuit_rejected;
        self.retries += other.retries;
        self.panics += other.panics;
        self.busy += other.busy;
    }
}

/// Summary produced by [`WorkerPool::shutdown`].
#[derive(Debug, Clone)]
pub struct PoolReport {
    /// Whether the pool drained its queue before stopping.
    pub drained: bool,
    /// Per-worker statistics, one entry per worker that exited cleanly.
    pub workers: Vec<WorkerStats>,
    /// Merged statistics across all workers.
    pub totals: WorkerStats,
    /// Queued tasks reported as cancelled instead of executed.
    pub abandoned: u64,
    /// Workers whose thread panicked outside task execution.
    pub lost_workers: usize,
}

impl PoolReport {
    pub(crate) fn new(drained: bool, workers: Vec<WorkerStats>, abandoned: u64, lost_workers: usize) -> Self {
        let mut totals = WorkerStats::default();
        for stats in &workers {
            totals.merge(stats);
        }
        Self {
            drained,
            workers,
            totals,
            abandoned,
            lost_workers,
        }
    }
}
