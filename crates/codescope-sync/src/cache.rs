//! Query cache seam and an in-memory implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use codescope_core::QueryKey;

/// A cache of server queries keyed by [`QueryKey`].
pub trait QueryCache: Send + Sync {
    /// Mark every entry whose key starts with `key` as stale.
    /// Returns how many entries matched.
    fn invalidate(&self, key: &QueryKey) -> usize;
}

/// One cached query result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheEntry {
    pub value: Value,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

/// One recorded `invalidate` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Invalidation {
    pub key: QueryKey,
    pub matched: usize,
    pub at: DateTime<Utc>,
}

/// Invalidations kept by [`MemoryQueryCache::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Concurrent in-memory cache that keeps the most recent invalidations.
#[derive(Debug)]
pub struct MemoryQueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    history: Mutex<VecDeque<Invalidation>>,
    history_limit: usize,
    invalidation_count: AtomicU64,
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` invalidations; older ones are discarded.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(limit.min(DEFAULT_HISTORY_LIMIT))),
            history_limit: limit,
            invalidation_count: AtomicU64::new(0),
        }
    }

    /// Store a fresh value, replacing any previous one.
    pub fn insert(&self, key: QueryKey, value: Value) {
        let _ = self.entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// `None` when the key is not cached.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.entries.get(key).map(|e| e.stale)
    }

    /// Keys currently marked stale, in no particular order.
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|e| e.stale)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained invalidations, oldest first.
    pub fn invalidations(&self) -> Vec<Invalidation> {
        self.history.lock().iter().cloned().collect()
    }

    /// Total `invalidate` calls, including those no longer retained.
    pub fn invalidation_count(&self) -> u64 {
        self.invalidation_count.load(Ordering::Relaxed)
    }

    /// Retained keys passed to `invalidate`, oldest first.
    pub fn invalidated_keys(&self) -> Vec<QueryKey> {
        self.history.lock().iter().map(|i| i.key.clone()).collect()
    }
}

impl QueryCache for MemoryQueryCache {
    fn invalidate(&self, key: &QueryKey) -> usize {
        let mut matched = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(key) {
                entry.stale = true;
                matched += 1;
            }
        }
        debug!(key = %key, matched, "queries invalidated");
        let _ = self.invalidation_count.fetch_add(1, Ordering::Relaxed);
        if self.history_limit > 0 {
            let mut history = self.history.lock();
            if history.len() == self.history_limit {
                let _ = history.pop_front();
            }
            history.push_back(Invalidation {
                key: key.clone(),
                matched,
                at: Utc::now(),
            });
        }
        matched
    }
}
