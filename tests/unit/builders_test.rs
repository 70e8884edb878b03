//! Tests for builder modules

use prometheus_task_engine::builders::PoolBuilder;
use prometheus_task_engine::config::PoolConfig;
use prometheus_task_engine::core::{FnExecutor, PoolError, SubmitOptions, TaskContext};
use prometheus_task_engine::policy::{CircuitBreaker, CircuitState};
use std::sync::Arc;

#[test]
fn test_pool_builder_keeps_config() {
    let builder = PoolBuilder::new(PoolConfig::new().with_worker_count(3).with_queue_capacity(7));
    assert_eq!(builder.config().worker_count, 3);
    assert_eq!(builder.config().queue_capacity, 7);
}

#[test]
fn test_pool_builder_validates_config() {
    let result = PoolBuilder::new(PoolConfig::new().with_result_capacity(0))
        .build(FnExecutor::new(|n: &u64, _ctx: &TaskContext| Ok(*n)));
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_pools_can_share_a_breaker() {
    let breaker = Arc::new(CircuitBreaker::new(&PoolConfig::default().circuit_breaker));
    let build = || {
        PoolBuilder::new(PoolConfig::new().with_worker_count(1))
            .with_circuit_breaker(Arc::clone(&breaker))
            .build(FnExecutor::new(|n: &u64, _ctx: &TaskContext| Ok(*n)))
            .unwrap()
    };
    let first = build();
    let second = build();

    for _ in 0..5 {
        let permit = breaker.allow().unwrap();
        breaker.record_result(permit, false);
    }
    assert_eq!(first.stats().circuit_state, CircuitState::Open);
    assert_eq!(
        second.submit(1, SubmitOptions::new()).unwrap_err(),
        PoolError::CircuitOpen
    );

    first.shutdown(true);
    second.shutdown(true);
}
