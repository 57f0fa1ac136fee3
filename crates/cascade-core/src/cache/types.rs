//! Cache types and data structures

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Namespace used for memoized settings file paths
pub const FILE_PATH_NAMESPACE: &str = "settings_file_path";

/// Cache key for identifying cached entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Key namespace (e.g., "settings_file_path")
    pub namespace: String,
    /// Unique identifier within the namespace
    pub identifier: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
        }
    }

    /// Key under which the resolved file path of a settings type is memoized
    pub fn file_path(type_name: &str) -> Self {
        Self::new(FILE_PATH_NAMESPACE, format!("{type_name}.FilePath"))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.identifier)
    }
}

/// Cache entry containing data and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached data
    pub data: serde_json::Value,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry expires (None means no expiration)
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of times this entry has been accessed
    pub access_count: u64,
    /// Last access time
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(data: serde_json::Value, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        let expires_at = ttl.and_then(|duration| {
            TimeDelta::from_std(duration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        });

        Self {
            data,
            created_at: now,
            expires_at,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against a given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Get time until expiration
    pub fn time_to_expiry(&self) -> Option<TimeDelta> {
        self.expires_at.map(|expires_at| expires_at - Utc::now())
    }
}

/// TTL and sizing policy for the settings cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// TTL applied when an insert does not specify one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Maximum number of entries kept in memory
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            capacity: 64,
        }
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// Removed through `invalidate`
    Explicit,
    /// Found past its expiry time
    Expired,
    /// Pushed out by the LRU capacity limit
    Evicted,
    /// Dropped by `clear`
    Cleared,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries that left the cache for any reason
    pub evictions: u64,
    /// Current number of entries
    pub entry_count: usize,
}

impl CacheStatistics {
    /// Hit rate as a ratio in `0.0..=1.0`
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_key() {
        let key = CacheKey::file_path("MyApp.AppSettings");
        assert_eq!(key.namespace, FILE_PATH_NAMESPACE);
        assert_eq!(key.identifier, "MyApp.AppSettings.FilePath");
    }

    #[test]
    fn test_entry_expiry() {
        let entry = CacheEntry::new(serde_json::json!("x"), Some(Duration::from_secs(60)));
        assert!(!entry.is_expired());
        assert!(entry.is_expired_at(Utc::now() + TimeDelta::seconds(61)));

        let forever = CacheEntry::new(serde_json::json!("x"), None);
        assert!(!forever.is_expired_at(Utc::now() + TimeDelta::days(3650)));
    }

    #[test]
    fn test_default_policy_is_one_day() {
        assert_eq!(
            CachePolicy::default().default_ttl,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStatistics {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStatistics::default().hit_rate(), 0.0);
    }
}
