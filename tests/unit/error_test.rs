//! Tests for error types

use prometheus_task_engine::core::{PoolError, TaskError};
use std::time::Duration;

#[test]
fn test_queue_full_error() {
    assert_eq!(format!("{}", PoolError::QueueFull), "task queue is full");
}

#[test]
fn test_pool_stopped_error() {
    assert_eq!(format!("{}", PoolError::PoolStopped), "pool has been shut down");
}

#[test]
fn test_invalid_config_error() {
    let err = PoolError::InvalidConfig("worker_count must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: worker_count must be greater than 0"
    );
}

#[test]
fn test_circuit_open_task_error() {
    assert_eq!(format!("{}", TaskError::CircuitOpen), "circuit-open");
}

#[test]
fn test_only_transient_execution_errors_retry() {
    assert!(TaskError::transient("io").is_retryable());
    assert!(!TaskError::permanent("bad input").is_retryable());
    assert!(!TaskError::Timeout(Duration::from_secs(1)).is_retryable());
    assert!(!TaskError::Cancelled.is_retryable());
    assert!(!TaskError::InternalFault("panic".into()).is_retryable());
    assert!(!TaskError::CircuitOpen.is_retryable());
}
