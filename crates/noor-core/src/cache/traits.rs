//! Cache backend trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// A cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached body.
    pub value: Vec<u8>,
    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
    /// Size of the cached body in bytes.
    pub size_bytes: u64,
}

/// Per-namespace statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Cache statistics across all namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub namespace_count: usize,
    pub namespaces: Vec<CacheMeta>,
}

/// Namespaced response cache with per-entry expiry and a per-namespace
/// entry bound.
///
/// Each namespace is one versioned cache name. Entries are ordered by
/// insertion; re-inserting a key makes it the newest. All operations are
/// synchronous to match rusqlite's API.
pub trait CacheBackend: Send + Sync {
    /// Get cached data by key. `None` if missing or expired.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_entry(namespace, key)?.map(|entry| entry.value))
    }

    /// Get cached data with full entry metadata. `None` if missing or expired.
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Store data for `ttl`, then evict the oldest entries past `max_entries`.
    ///
    /// Returns the number of evicted entries.
    fn put(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Duration,
        max_entries: Option<NonZeroU32>,
    ) -> Result<usize> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.put_with_expiry(namespace, key, value, expires_at, max_entries)
    }

    /// Store data with an explicit expiration time.
    fn put_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
        max_entries: Option<NonZeroU32>,
    ) -> Result<usize>;

    /// Delete one key. Returns whether it existed.
    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Delete a whole namespace. Returns the number of entries removed.
    fn invalidate_namespace(&self, namespace: &str) -> Result<usize>;

    /// Names of every namespace holding at least one entry.
    fn namespaces(&self) -> Result<Vec<String>>;

    /// Check if an entry exists and has not expired.
    fn is_valid(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get_entry(namespace, key)?.is_some())
    }

    /// Overall statistics.
    fn get_stats(&self) -> Result<CacheStats>;

    /// Remove expired entries from all namespaces. Returns the number removed.
    fn cleanup_expired(&self) -> Result<usize>;

    /// Clear all cached data across all namespaces.
    fn clear_all(&self) -> Result<()>;
}
