//! Tests for configuration validation and loading

use prometheus_task_engine::config::{PoolConfig, RateLimitConfig, RetryConfig};
use std::collections::HashMap;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_pool_config_defaults_are_valid() {
    let config = PoolConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.worker_count >= 1);
    assert!(config.rate_limit.is_none());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    assert!(PoolConfig::new().with_worker_count(0).validate().is_err());
}

#[test]
fn test_zero_queue_capacity_is_rendezvous_not_invalid() {
    assert!(PoolConfig::new().with_queue_capacity(0).validate().is_ok());
}

#[test]
fn test_pool_config_invalid_rate_limit() {
    assert!(PoolConfig::new().with_rate_limit(0, 1.0).validate().is_err());
    assert!(PoolConfig::new().with_rate_limit(5, -1.0).validate().is_err());
    assert!(PoolConfig::new().with_rate_limit(5, 0.0).validate().is_ok());
}

#[test]
fn test_pool_config_invalid_retry() {
    let config = PoolConfig::new().with_retry(RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    });
    assert!(config.validate().is_err());

    let config = PoolConfig::new().with_retry(RetryConfig {
        initial_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(1),
        ..RetryConfig::default()
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_pool_config_from_json() {
    let config = PoolConfig::from_json_str(
        r#"{
            "worker_count": 3,
            "queue_capacity": 0,
            "rate_limit": { "capacity": 10, "refill_per_second": 5.0 },
            "circuit_breaker": { "failure_threshold": 2, "cooldown_ms": 250 },
            "retry": { "max_attempts": 4, "per_task_deadline_ms": 1500 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.worker_count, 3);
    assert_eq!(config.queue_capacity, 0);
    assert_eq!(
        config.rate_limit,
        Some(RateLimitConfig {
            capacity: 10,
            refill_per_second: 5.0
        })
    );
    assert_eq!(config.circuit_breaker.failure_threshold, 2);
    assert_eq!(config.circuit_breaker.cooldown, Duration::from_millis(250));
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.per_task_deadline, Some(Duration::from_millis(1500)));
    assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
}

#[test]
fn test_pool_config_from_json_rejects_invalid() {
    assert!(PoolConfig::from_json_str(r#"{ "worker_count": 0 }"#).is_err());
    assert!(PoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_pool_config_from_lookup() {
    let config = PoolConfig::from_lookup(lookup(&[
        ("ENGINE_WORKER_COUNT", "6"),
        ("ENGINE_RATE_LIMIT_CAPACITY", "20"),
        ("ENGINE_RATE_LIMIT_REFILL_PER_SECOND", "2.5"),
        ("ENGINE_BREAKER_COOLDOWN_MS", "500"),
        ("ENGINE_RETRY_MAX_ATTEMPTS", " 2 "),
    ]))
    .unwrap();

    assert_eq!(config.worker_count, 6);
    assert_eq!(config.rate_limit.as_ref().map(|r| r.capacity), Some(20));
    assert_eq!(config.circuit_breaker.cooldown, Duration::from_millis(500));
    assert_eq!(config.retry.max_attempts, 2);
}

#[test]
fn test_pool_config_from_lookup_errors() {
    let err = PoolConfig::from_lookup(lookup(&[("ENGINE_WORKER_COUNT", "many")])).unwrap_err();
    assert!(err.to_string().contains("ENGINE_WORKER_COUNT"));

    assert!(PoolConfig::from_lookup(lookup(&[("ENGINE_RATE_LIMIT_REFILL_PER_SECOND", "1")])).is_err());
    assert!(PoolConfig::from_lookup(lookup(&[("ENGINE_WORKER_COUNT", "0")])).is_err());
}

#[test]
fn test_pool_config_round_trips_through_json() {
    let config = PoolConfig::new().with_worker_count(2).with_rate_limit(8, 4.0);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(PoolConfig::from_json_str(&json).unwrap(), config);
}
