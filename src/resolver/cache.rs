//! Permission result cache
//!
//! Concurrent `(user, node) -> bool` map with per-user and full
//! invalidation. Every invalidation advances an epoch; results computed
//! before the latest invalidation are refused on insert.

use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Cache key for a single lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user: String,
    pub node: String,
}

impl CacheKey {
    pub fn new(user: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            node: node.into(),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub epoch: u64,
}

/// Concurrent result cache
pub struct ResultCache {
    entries: DashMap<CacheKey, bool>,
    enabled: bool,
    max_entries: usize,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            max_entries: config.max_entries.max(1),
            epoch: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..Default::default()
        })
    }

    /// Current invalidation epoch; pass it back to [`ResultCache::insert`]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn get(&self, user: &str, node: &str) -> Option<bool> {
        if !self.enabled {
            return None;
        }

        let key = CacheKey::new(user, node);
        match self.entries.get(&key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result computed while `epoch` was current
    ///
    /// Returns `false` when the value was refused because an invalidation
    /// happened in between (or the cache is disabled).
    pub fn insert(&self, user: &str, node: &str, allowed: bool, epoch: u64) -> bool {
        if !self.enabled || self.epoch() != epoch {
            return false;
        }

        if self.entries.len() >= self.max_entries {
            self.evict();
        }

        let key = CacheKey::new(user, node);
        self.entries.insert(key.clone(), allowed);

        // An invalidation may have landed between the check and the insert
        if self.epoch() != epoch {
            self.entries.remove(&key);
            return false;
        }
        true
    }

    /// Drop every cached result for one user
    pub fn drop_user(&self, user: &str) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.retain(|key, _| key.user != user);
        debug!(user, "Dropped cached results for user");
    }

    /// Drop every cached result
    pub fn drop_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        debug!("Dropped all cached results");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            epoch: self.epoch(),
        }
    }

    fn evict(&self) {
        let to_remove = (self.max_entries / 10).max(1);
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .take(to_remove)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        trace!(evicted = keys.len(), "Cache full, evicted entries");
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
