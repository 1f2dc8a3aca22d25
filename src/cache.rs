//! Bounded LRU cache for parsed statements.
//!
//! Keys are normalized SQL ([`normalize_sql`]). A single lock guards the
//! entries and the hit/miss counters, and it is held across the
//! lookup-parse-insert sequence of [`StatementCache::get_or_try_insert`] so
//! that concurrent callers never parse the same statement twice.

use std::num::NonZeroUsize;

use compact_str::CompactString;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{context::Ast, error::GuardResult};

/// Default number of cached statements
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Cache key for SQL text: surrounding whitespace removed, lowercased.
pub fn normalize_sql(sql: &str) -> CompactString {
    sql.trim().to_lowercase().into()
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits:     u64,
    pub misses:   u64,
    pub size:     usize,
    pub capacity: usize
}

impl CacheStats {
    /// Share of lookups served from the cache, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: LruCache<CompactString, Ast>,
    hits:    u64,
    misses:  u64
}

/// Thread-safe LRU cache of parsed statements
pub struct StatementCache {
    state: Mutex<CacheState>
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl StatementCache {
    /// Create a cache holding at most `max_size` statements (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits:    0,
                misses:  0
            })
        }
    }

    /// Look up `sql`, counting a hit or a miss.
    pub fn get(&self, sql: &str) -> Option<Ast> {
        let key = normalize_sql(sql);
        let mut state = self.state.lock();
        match state.entries.get(&key).cloned() {
            Some(ast) => {
                state.hits += 1;
                Some(ast)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, sql: &str, ast: Ast) {
        let key = normalize_sql(sql);
        self.state.lock().entries.put(key, ast);
    }

    /// Return the cached statement for `sql` or run `parse` and cache its
    /// output. Failed parses are not cached.
    pub fn get_or_try_insert<F>(&self, sql: &str, parse: F) -> GuardResult<Ast>
    where
        F: FnOnce() -> GuardResult<Ast>
    {
        let key = normalize_sql(sql);
        let mut state = self.state.lock();
        if let Some(ast) = state.entries.get(&key).cloned() {
            state.hits += 1;
            return Ok(ast);
        }
        state.misses += 1;
        let ast = parse()?;
        state.entries.put(key, ast.clone());
        Ok(ast)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits:     state.hits,
            misses:   state.misses,
            size:     state.entries.len(),
            capacity: state.entries.cap().get()
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }
}
