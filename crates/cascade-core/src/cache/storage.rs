//! In-memory settings cache backed by an LRU map

use super::types::{CacheEntry, CacheKey, CachePolicy, CacheStatistics, InvalidationReason};
use crate::error::{CascadeError, CascadeResult};
use chrono::Utc;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Callback fired whenever an entry leaves the cache
pub type InvalidationHook = Arc<dyn Fn(&CacheKey, InvalidationReason) + Send + Sync>;

/// Thread-safe TTL cache injected into settings repositories.
///
/// Hooks run after the internal lock has been released, so a hook may call
/// back into the cache.
pub struct SettingsCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    stats: Mutex<CacheStatistics>,
    hooks: RwLock<Vec<InvalidationHook>>,
    policy: CachePolicy,
}

impl std::fmt::Debug for SettingsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsCache")
            .field("policy", &self.policy)
            .field("entries", &self.entries.lock().len())
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl SettingsCache {
    /// Create a cache with the given policy
    pub fn new(policy: CachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            stats: Mutex::new(CacheStatistics::default()),
            hooks: RwLock::new(Vec::new()),
            policy,
        }
    }

    /// Create a shareable cache
    pub fn shared(policy: CachePolicy) -> Arc<Self> {
        Arc::new(Self::new(policy))
    }

    /// The policy this cache was built with
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Register a hook fired when entries are invalidated, expire or get evicted
    pub fn on_invalidate<F>(&self, hook: F)
    where
        F: Fn(&CacheKey, InvalidationReason) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(hook));
    }

    /// Get a live entry and mark it accessed
    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut expired = false;
        let found = {
            let mut entries = self.entries.lock();
            let mut stats = self.stats.lock();

            match entries.peek(key).map(CacheEntry::is_expired) {
                Some(true) => {
                    entries.pop(key);
                    stats.evictions += 1;
                    stats.misses += 1;
                    stats.entry_count = entries.len();
                    expired = true;
                    None
                }
                Some(false) => {
                    stats.hits += 1;
                    entries.get_mut(key).map(|entry| {
                        entry.mark_accessed();
                        entry.clone()
                    })
                }
                None => {
                    stats.misses += 1;
                    None
                }
            }
        };

        if expired {
            tracing::debug!(key = %key, "cache entry expired");
            self.fire(key, InvalidationReason::Expired);
        }
        found
    }

    /// Get a typed value; entries that no longer deserialize count as a miss
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.get_entry(key)?;
        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, "cached value has an unexpected shape: {}", e);
                None
            }
        }
    }

    /// Insert a value; `ttl` of `None` applies the policy's default TTL
    pub fn insert<T: Serialize>(
        &self,
        key: CacheKey,
        value: T,
        ttl: Option<Duration>,
    ) -> CascadeResult<()> {
        let data = serde_json::to_value(value)
            .map_err(|e| CascadeError::cache(format!("Failed to serialize cache value: {e}")))?;
        let entry = CacheEntry::new(data, Some(ttl.unwrap_or(self.policy.default_ttl)));

        let evicted = {
            let mut entries = self.entries.lock();
            let mut stats = self.stats.lock();
            let pushed_out = entries.push(key.clone(), entry);
            stats.entry_count = entries.len();

            match pushed_out {
                Some((old_key, _)) if old_key != key => {
                    stats.evictions += 1;
                    Some(old_key)
                }
                _ => None,
            }
        };

        if let Some(old_key) = evicted {
            self.fire(&old_key, InvalidationReason::Evicted);
        }
        Ok(())
    }

    /// Remove an entry, returning whether it was present
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let mut stats = self.stats.lock();
            let removed = entries.pop(key).is_some();
            if removed {
                stats.evictions += 1;
                stats.entry_count = entries.len();
            }
            removed
        };

        if removed {
            self.fire(key, InvalidationReason::Explicit);
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&self) {
        let keys: Vec<CacheKey> = {
            let mut entries = self.entries.lock();
            let mut stats = self.stats.lock();
            let keys = entries.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>();
            stats.evictions += keys.len() as u64;
            entries.clear();
            stats.entry_count = 0;
            keys
        };

        for key in &keys {
            self.fire(key, InvalidationReason::Cleared);
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<CacheKey> = {
            let mut entries = self.entries.lock();
            let mut stats = self.stats.lock();

            let expired: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.pop(key);
            }
            stats.evictions += expired.len() as u64;
            stats.entry_count = entries.len();
            expired
        };

        for key in &expired {
            self.fire(key, InvalidationReason::Expired);
        }
        expired.len()
    }

    /// Snapshot of the cache statistics
    pub fn statistics(&self) -> CacheStatistics {
        self.stats.lock().clone()
    }

    /// Number of entries currently held (expired entries included until touched)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fire(&self, key: &CacheKey, reason: InvalidationReason) {
        let hooks: Vec<InvalidationHook> = self.hooks.read().clone();
        for hook in hooks {
            hook(key, reason);
        }
    }
}
