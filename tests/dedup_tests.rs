use std::time::{Duration, Instant};

use sql_guard::{
    GuardError,
    dedup::{DEFAULT_DEDUP_CACHE_SIZE, DEFAULT_DEDUP_TTL_MS, DedupScope, SqlDeduplicationFilter}
};

#[test]
fn test_repeat_within_ttl_is_skipped() {
    let mut scope = DedupScope::new(10, Duration::from_millis(100));
    let start = Instant::now();
    assert!(scope.should_check_at("SELECT * FROM users WHERE id = 1", start));
    assert!(!scope.should_check_at("SELECT * FROM users WHERE id = 1", start + Duration::from_millis(10)));
    assert!(scope.should_check_at("SELECT * FROM users WHERE id = 1", start + Duration::from_millis(150)));
}

#[test]
fn test_suppressed_call_keeps_original_timestamp() {
    let mut scope = DedupScope::new(10, Duration::from_millis(100));
    let start = Instant::now();
    assert!(scope.should_check_at("SELECT 1 FROM t", start));
    assert!(!scope.should_check_at("SELECT 1 FROM t", start + Duration::from_millis(90)));
    assert!(scope.should_check_at("SELECT 1 FROM t", start + Duration::from_millis(110)));
}

#[test]
fn test_key_is_normalized() {
    let mut scope = DedupScope::new(10, Duration::from_secs(60));
    assert!(scope.should_check("SELECT * FROM users"));
    assert!(!scope.should_check("  select * from USERS  "));
    assert!(scope.should_check("SELECT * FROM orders"));
    assert_eq!(scope.len(), 2);
}

#[test]
fn test_scope_evicts_least_recent() {
    let mut scope = DedupScope::new(2, Duration::from_secs(60));
    assert!(scope.should_check("SELECT a FROM t"));
    assert!(scope.should_check("SELECT b FROM t"));
    assert!(scope.should_check("SELECT c FROM t"));
    assert_eq!(scope.len(), 2);
    assert!(scope.should_check("SELECT a FROM t"));
}

#[test]
fn test_scope_clear() {
    let mut scope = DedupScope::new(10, Duration::from_secs(60));
    assert!(scope.should_check("SELECT 1 FROM t"));
    scope.clear();
    assert!(scope.is_empty());
    assert!(scope.should_check("SELECT 1 FROM t"));
}

#[test]
fn test_zero_ttl_never_suppresses() {
    let mut scope = DedupScope::new(10, Duration::ZERO);
    let now = Instant::now();
    assert!(scope.should_check_at("SELECT 1 FROM t", now));
    assert!(scope.should_check_at("SELECT 1 FROM t", now));
}

#[test]
fn test_filter_defaults() {
    let filter = SqlDeduplicationFilter::default();
    assert!(filter.is_enabled());
    assert_eq!(filter.ttl(), Duration::from_millis(DEFAULT_DEDUP_TTL_MS));
    assert_eq!(DEFAULT_DEDUP_CACHE_SIZE, 1000);
}

#[test]
fn test_filter_rejects_zero_size() {
    assert!(matches!(
        SqlDeduplicationFilter::new(0, Duration::from_millis(100)),
        Err(GuardError::Configuration(_))
    ));
}

#[test]
fn test_disabled_filter_always_checks() {
    let filter = SqlDeduplicationFilter::disabled();
    assert!(!filter.is_enabled());
    assert!(filter.should_check("SELECT 1 FROM t"));
    assert!(filter.should_check("SELECT 1 FROM t"));
    let mut scope = filter.new_scope();
    assert!(filter.should_check_in(&mut scope, "SELECT 1 FROM t"));
    assert!(filter.should_check_in(&mut scope, "SELECT 1 FROM t"));
}

#[test]
fn test_thread_scope_and_clear() {
    let filter = SqlDeduplicationFilter::new(10, Duration::from_secs(60)).unwrap();
    assert!(filter.should_check("DELETE FROM users WHERE id = 1"));
    assert!(!filter.should_check("DELETE FROM users WHERE id = 1"));
    SqlDeduplicationFilter::clear_thread_cache();
    assert!(filter.should_check("DELETE FROM users WHERE id = 1"));
    SqlDeduplicationFilter::clear_thread_cache();
}

#[test]
fn test_thread_scopes_are_not_shared() {
    let filter = SqlDeduplicationFilter::new(10, Duration::from_secs(60)).unwrap();
    assert!(filter.should_check("SELECT * FROM users WHERE id = 7"));
    std::thread::scope(|s| {
        s.spawn(|| assert!(filter.should_check("SELECT * FROM users WHERE id = 7")));
    });
    assert!(!filter.should_check("SELECT * FROM users WHERE id = 7"));
    SqlDeduplicationFilter::clear_thread_cache();
}

#[test]
fn test_caller_owned_scopes_are_independent() {
    let filter = SqlDeduplicationFilter::new(10, Duration::from_secs(60)).unwrap();
    let mut first = filter.new_scope();
    let mut second = filter.new_scope();
    assert!(filter.should_check_in(&mut first, "SELECT 1 FROM t"));
    assert!(!filter.should_check_in(&mut first, "SELECT 1 FROM t"));
    assert!(filter.should_check_in(&mut second, "SELECT 1 FROM t"));
    assert_eq!(first.ttl(), Duration::from_secs(60));
}
