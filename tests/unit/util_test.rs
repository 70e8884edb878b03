//! Tests for utility functions

use prometheus_task_engine::util::{Clock, ManualClock, Priority, TaskId};
use std::time::Duration;

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_serde() {
    assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
    let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
    assert_eq!(parsed, Priority::Low);
}

#[test]
fn test_manual_clock_clones_share_time() {
    let clock = ManualClock::new();
    let shared = clock.clone();
    let start = clock.now();

    shared.advance(Duration::from_millis(250));
    assert_eq!(clock.now() - start, Duration::from_millis(250));

    shared.rewind(Duration::from_millis(50));
    assert_eq!(clock.now() - start, Duration::from_millis(200));
}

#[test]
fn test_task_id() {
    let id: TaskId = 12345;
    assert_eq!(id, 12345);
}
