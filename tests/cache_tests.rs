// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use sql_guard::{
    cache::{StatementCache, normalize_sql},
    parser::SqlParserFacade
};

fn ast(sql: &str) -> sql_guard::context::Ast {
    SqlParserFacade::default().try_parse(sql).unwrap()
}

#[test]
fn test_normalize_sql() {
    assert_eq!(normalize_sql("  SELECT * FROM Users \n"), "select * from users");
    assert_eq!(normalize_sql("select 1"), normalize_sql("SELECT 1"));
}

#[test]
fn test_statement_cache_get_counts_hits_and_misses() {
    let cache = StatementCache::new(10);
    assert!(cache.get("SELECT 1").is_none());
    cache.insert("SELECT 1", ast("SELECT 1"));
    assert!(cache.get(" select 1 ").is_some());
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.capacity, 10);
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_statement_cache_eviction() {
    let cache = StatementCache::new(2);
    cache.insert("SELECT 1", ast("SELECT 1"));
    cache.insert("SELECT 2", ast("SELECT 2"));
    assert!(cache.get("SELECT 1").is_some());
    cache.insert("SELECT 3", ast("SELECT 3"));
    assert_eq!(cache.len(), 2);
    assert!(cache.get("SELECT 2").is_none());
    assert!(cache.get("SELECT 1").is_some());
    assert!(cache.get("SELECT 3").is_some());
}

#[test]
fn test_statement_cache_zero_size_holds_one() {
    let cache = StatementCache::new(0);
    cache.insert("SELECT 1", ast("SELECT 1"));
    assert_eq!(cache.stats().capacity, 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_get_or_try_insert_parses_once() {
    let cache = StatementCache::new(10);
    let mut calls = 0;
    let first = cache
        .get_or_try_insert("SELECT id FROM users", || {
            calls += 1;
            Ok(ast("SELECT id FROM users"))
        })
        .unwrap();
    let second = cache
        .get_or_try_insert("SELECT id FROM users", || panic!("cached statement parsed again"))
        .unwrap();
    assert_eq!(calls, 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_get_or_try_insert_does_not_cache_failures() {
    let facade = SqlParserFacade::default();
    let cache = StatementCache::new(10);
    assert!(cache.get_or_try_insert("SELEC 1", || facade.try_parse("SELEC 1")).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_clear_resets_counters() {
    let cache = StatementCache::new(10);
    cache.insert("SELECT 1", ast("SELECT 1"));
    let _ = cache.get("SELECT 1");
    let _ = cache.get("SELECT 2");
    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.size, 0);
    assert_eq!(stats.hit_rate(), 0.0);
}

#[test]
fn test_facade_parse_cached_shares_instance() {
    let facade = SqlParserFacade::default();
    let first = facade.parse_cached("SELECT * FROM users WHERE id = 1").unwrap().unwrap();
    let second = facade
        .parse_cached("  select * from users where id = 1  ")
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let stats = facade.cache_statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    facade.clear_cache();
    assert_eq!(facade.cache_statistics().size, 0);
}

#[test]
fn test_facade_cache_is_shared_between_threads() {
    let facade = Arc::new(SqlParserFacade::default());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let facade = Arc::clone(&facade);
            std::thread::spawn(move || {
                facade.parse_cached("SELECT name FROM users WHERE id = 7").unwrap().unwrap()
            })
        })
        .collect();
    let asts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(asts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    let stats = facade.cache_statistics();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 3);
}
