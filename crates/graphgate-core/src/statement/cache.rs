//! Open-mode cache of compiled statements.
//!
//! Compiling a query is deterministic for a given query text, role and
//! variable key set, so the compiled candidates can be reused across
//! requests. Concurrent misses for the same key may both compile; the last
//! insert wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use xxhash_rust::xxh64::Xxh64;

use super::compiler::Statement;
use super::prepared::collapse_whitespace;
use crate::json;

/// Cache key for a compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Key over the normalized query text, the role, and the variable keys.
    ///
    /// Variable values are bound after compilation and do not take part.
    pub fn new(query: &str, role: &str, variables: Option<&[u8]>) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.update(collapse_whitespace(query).as_bytes());
        hasher.update(&[0]);
        hasher.update(role.as_bytes());
        if let Some(vars) = variables {
            for key in json::keys(vars) {
                hasher.update(&[0]);
                hasher.update(key);
            }
        }
        Self(hasher.digest())
    }
}

struct CachedStatements {
    statements: Arc<Vec<Statement>>,
    hit_count: AtomicU64,
}

impl CachedStatements {
    fn record_hit(&self) -> u64 {
        self.hit_count.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    fn hits(&self) -> u64 {
        self.hit_count.load(AtomicOrdering::Relaxed)
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Bounded statement cache that evicts the least-hit entry when full.
pub struct StatementCache {
    cache: RwLock<HashMap<CacheKey, CachedStatements>>,
    max_entries: usize,
    stats: CacheStats,
}

impl StatementCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_entries,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Statement>>> {
        let guard = self.cache.read().ok()?;

        if let Some(cached) = guard.get(key) {
            cached.record_hit();
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Some(Arc::clone(&cached.statements));
        }

        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        None
    }

    pub fn insert(&self, key: CacheKey, statements: Arc<Vec<Statement>>) {
        if self.max_entries == 0 {
            return;
        }

        let mut guard = match self.cache.write() {
            Ok(g) => g,
            Err(_) => return,
        };

        if guard.len() >= self.max_entries && !guard.contains_key(&key) {
            self.evict(&mut guard);
        }

        guard.insert(
            key,
            CachedStatements {
                statements,
                hit_count: AtomicU64::new(0),
            },
        );
    }

    fn evict(&self, cache: &mut HashMap<CacheKey, CachedStatements>) {
        let evict_key = cache
            .iter()
            .min_by_key(|(_, v)| v.hits())
            .map(|(k, _)| *k);

        if let Some(key) = evict_key {
            cache.remove(&key);
            self.stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.cache.write() {
            guard.clear();
        }
    }
}
