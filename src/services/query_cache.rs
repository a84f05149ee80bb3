//! Query Cache
//!
//! Bounded in-memory map from a request fingerprint to the generated
//! query list. Entries expire on a write-TTL; when the cache is full
//! the oldest entry is evicted. Safe for concurrent readers and
//! writers; a miss is never an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::models::{GeneratedQueries, QueryCacheKey};

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
}

struct CacheEntry {
    queries: GeneratedQueries,
    inserted_at: Instant,
}

pub struct QueryCache {
    entries: DashMap<QueryCacheKey, CacheEntry>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_size: config.max_size.max(1),
            ttl: Duration::from_secs((config.ttl_hours.max(0) as u64) * 3600),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Fetch a live entry; the returned list is flagged `from_cache`.
    pub fn get(&self, key: &QueryCacheKey) -> Option<GeneratedQueries> {
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() <= self.ttl {
                let mut queries = entry.queries.clone();
                queries.from_cache = true;
                Some(queries)
            } else {
                None
            }
        });

        match hit {
            Some(queries) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(queries)
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    pub fn put(&self, key: QueryCacheKey, queries: GeneratedQueries) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_one();
        }
        self.entries
            .insert(key, CacheEntry { queries, inserted_at: Instant::now() });
    }

    /// Drop expired entries first; if none are expired, drop the oldest.
    fn evict_one(&self) {
        let mut expired: Vec<QueryCacheKey> = Vec::new();
        let mut oldest: Option<(QueryCacheKey, Instant)> = None;

        for entry in self.entries.iter() {
            if entry.inserted_at.elapsed() > self.ttl {
                expired.push(entry.key().clone());
            } else if oldest
                .as_ref()
                .map(|(_, t)| entry.inserted_at < *t)
                .unwrap_or(true)
            {
                oldest = Some((entry.key().clone(), entry.inserted_at));
            }
        }

        if expired.is_empty() {
            if let Some((key, _)) = oldest {
                self.entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            let count = expired.len() as u64;
            for key in expired {
                self.entries.remove(&key);
            }
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
