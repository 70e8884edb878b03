//! # Prometheus Task Engine
//!
//! A bounded, fault-tolerant task execution engine for in-process workloads.
//!
//! Callers submit independent tasks; a fixed pool of worker threads executes
//! them through a caller-supplied executor and publishes one result per
//! accepted task on a bounded result stream.
//!
//! ## Core Problem Solved
//!
//! Work that fans out to an unreliable or rate-limited dependency needs more
//! than a thread pool:
//!
//! - **Overload**: submissions beyond a configured rate are refused up front
//! - **Cascading failure**: a circuit breaker stops hammering a failing dependency
//! - **Transient errors**: bounded retries with exponential backoff and a total deadline
//! - **Unbounded memory**: both the job queue and the result stream are bounded
//!
//! ## Key Features
//!
//! - **Token bucket admission** (or any [`policy::AdmissionController`])
//! - **Priority job queue** with blocking hand-off and rendezvous mode
//! - **Circuit breaker** with half-open single-trial probing and cooldown backoff
//! - **Panic isolation**: executor panics become [`core::TaskError::InternalFault`]
//! - **Graceful shutdown**: drain or abandon, with a [`core::PoolReport`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::PoolConfig;
//! use prometheus_task_engine::core::{FnExecutor, SubmitOptions, TaskError, WorkerPool};
//!
//! let executor = FnExecutor::new(|n: &u64, _ctx| Ok::<_, TaskError>(n * n));
//! let pool = WorkerPool::new(
//!     PoolConfig::new()
//!         .with_worker_count(4)
//!         .with_queue_capacity(128)
//!         .with_rate_limit(100, 50.0),
//!     executor,
//! )?;
//! let results = pool.results();
//!
//! for n in 0..10 {
//!     pool.submit(n, SubmitOptions::new())?;
//! }
//! let report = pool.shutdown(true);
//!
//! for result in results {
//!     println!("{} -> {:?}", result.task_id, result.outcome);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core task model, executor trait, and worker pool.
pub mod core;
/// Configuration models for pools and policies.
pub mod config;
/// Builders to assemble pools from configuration.
pub mod builders;
/// Infrastructure: the bounded job queue.
pub mod infra;
/// Admission control, circuit breaking, and retry policies.
pub mod policy;
/// Shared utilities.
pub mod util;
