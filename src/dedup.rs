//! Short-window suppression of repeated statements.
//!
//! The same SQL executed many times in a tight loop only needs one
//! validation. A [`DedupScope`] remembers when each normalized statement was
//! last checked and answers `false` while the statement is inside its TTL
//! window. Scopes are owned by one worker and never shared; callers that
//! reuse threads across tasks clear them at task boundaries with
//! [`SqlDeduplicationFilter::clear_thread_cache`].
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use sql_guard::dedup::DedupScope;
//!
//! let mut scope = DedupScope::new(100, Duration::from_millis(100));
//! let start = Instant::now();
//! assert!(scope.should_check_at("SELECT * FROM users", start));
//! assert!(!scope.should_check_at("select * from users  ", start + Duration::from_millis(50)));
//! assert!(scope.should_check_at("SELECT * FROM users", start + Duration::from_millis(150)));
//! ```

use std::{
    cell::RefCell,
    collections::HashMap,
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant}
};

use compact_str::CompactString;
use lru::LruCache;

use crate::{
    cache::normalize_sql,
    error::{GuardResult, config_error}
};

/// Default number of remembered statements per worker
pub const DEFAULT_DEDUP_CACHE_SIZE: usize = 1000;

/// Default suppression window in milliseconds
pub const DEFAULT_DEDUP_TTL_MS: u64 = 100;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static THREAD_SCOPES: RefCell<HashMap<u64, DedupScope>> = RefCell::new(HashMap::new());
}

/// Per-worker record of recently checked statements.
#[derive(Debug)]
pub struct DedupScope {
    entries: LruCache<CompactString, Instant>,
    ttl:     Duration
}

impl DedupScope {
    /// Scope remembering at most `cache_size` statements (minimum 1).
    pub fn new(cache_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl
        }
    }

    pub fn should_check(&mut self, sql: &str) -> bool {
        self.should_check_at(sql, Instant::now())
    }

    /// Like [`DedupScope::should_check`] with an explicit clock.
    ///
    /// A suppressed call leaves the stored timestamp untouched, so a
    /// statement repeated faster than the TTL is still checked once per
    /// window.
    pub fn should_check_at(&mut self, sql: &str, now: Instant) -> bool {
        let key = normalize_sql(sql);
        match self.entries.get(&key).copied() {
            Some(last) if now.saturating_duration_since(last) < self.ttl => false,
            _ => {
                self.entries.put(key, now);
                true
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Factory and thread-attached default for [`DedupScope`]s.
///
/// Dropping a filter releases its scope on the dropping thread only. Scopes
/// it left on other threads stay until those threads exit or call
/// [`SqlDeduplicationFilter::clear_thread_cache`].
#[derive(Debug)]
pub struct SqlDeduplicationFilter {
    id:         u64,
    cache_size: usize,
    ttl:        Duration,
    enabled:    bool
}

impl Default for SqlDeduplicationFilter {
    fn default() -> Self {
        Self::with_parts(
            DEFAULT_DEDUP_CACHE_SIZE,
            Duration::from_millis(DEFAULT_DEDUP_TTL_MS),
            true
        )
    }
}

impl SqlDeduplicationFilter {
    /// Fails for a zero `cache_size`.
    pub fn new(cache_size: usize, ttl: Duration) -> GuardResult<Self> {
        if cache_size == 0 {
            return Err(config_error("deduplication cache size must be greater than 0"));
        }
        Ok(Self::with_parts(cache_size, ttl, true))
    }

    /// Filter that lets every statement through.
    pub fn disabled() -> Self {
        Self::with_parts(DEFAULT_DEDUP_CACHE_SIZE, Duration::ZERO, false)
    }

    fn with_parts(cache_size: usize, ttl: Duration, enabled: bool) -> Self {
        Self {
            id: NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed),
            cache_size,
            ttl,
            enabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh scope with this filter's size and TTL.
    pub fn new_scope(&self) -> DedupScope {
        DedupScope::new(self.cache_size, self.ttl)
    }

    /// Check against the calling thread's scope, creating it on first use.
    pub fn should_check(&self, sql: &str) -> bool {
        if !self.enabled {
            return true;
        }
        THREAD_SCOPES.with_borrow_mut(|scopes| {
            scopes
                .entry(self.id)
                .or_insert_with(|| self.new_scope())
                .should_check(sql)
        })
    }

    /// Check against a caller-owned scope.
    pub fn should_check_in(&self, scope: &mut DedupScope, sql: &str) -> bool {
        !self.enabled || scope.should_check(sql)
    }

    /// Drop every scope attached to the calling thread.
    pub fn clear_thread_cache() {
        THREAD_SCOPES.with_borrow_mut(HashMap::clear);
    }
}

impl Drop for SqlDeduplicationFilter {
    fn drop(&mut self) {
        let id = self.id;
        let _ = THREAD_SCOPES.try_with(|scopes| {
            if let Ok(mut scopes) = scopes.try_borrow_mut() {
                scopes.remove(&id);
            }
        });
    }
}
