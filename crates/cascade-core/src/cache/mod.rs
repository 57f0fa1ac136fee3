//! Settings cache
//!
//! Resolving which settings file an application should use involves copying
//! and merging files, so the resolved path is memoized per settings type.
//! The cache is an explicit service handed to the repository rather than
//! process-wide state: callers choose the TTL policy, can share one cache
//! across repositories, and can observe or force invalidation.

pub mod storage;
pub mod types;

pub use storage::{InvalidationHook, SettingsCache};
pub use types::{
    CacheEntry, CacheKey, CachePolicy, CacheStatistics, FILE_PATH_NAMESPACE, InvalidationReason,
};
