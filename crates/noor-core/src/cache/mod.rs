//! Versioned response cache.
//!
//! Backs the cache-lookup and cache-invalidate capability handed to the
//! rendering layer:
//! - one namespace per versioned cache name
//! - per-entry expiry and a FIFO entry bound from the category policy
//! - orphan purge of caches left behind by older versions

mod sqlite;
mod traits;

pub use sqlite::SqliteCache;
pub use traits::{CacheBackend, CacheEntry, CacheMeta, CacheStats};

use crate::error::Result;
use crate::registry::{CacheCategory, CacheRegistry};
use tracing::{debug, info};

/// Binds a [`CacheRegistry`] to a [`CacheBackend`].
pub struct ResponseCache<B: CacheBackend> {
    registry: CacheRegistry,
    backend: B,
}

impl<B: CacheBackend> ResponseCache<B> {
    pub fn new(registry: CacheRegistry, backend: B) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fresh cached body for `key` in the current version's `category` cache.
    pub fn lookup(&self, category: CacheCategory, key: &str) -> Result<Option<Vec<u8>>> {
        let name = self.registry.cache_name_for(category);
        self.backend.get(name.as_str(), key)
    }

    /// Store a body under the category's policy.
    pub fn store(&self, category: CacheCategory, key: &str, body: &[u8]) -> Result<()> {
        let name = self.registry.cache_name_for(category);
        let policy = self.registry.policy_for(category);
        let evicted = self.backend.put(
            name.as_str(),
            key,
            body,
            policy.expiration,
            Some(policy.max_entries),
        )?;
        if evicted > 0 {
            debug!("Storing '{}' in {} evicted {} entries", key, name, evicted);
        }
        Ok(())
    }

    pub fn invalidate(&self, category: CacheCategory, key: &str) -> Result<bool> {
        let name = self.registry.cache_name_for(category);
        self.backend.invalidate(name.as_str(), key)
    }

    /// Cached response for a request URL, routed through the strategy table.
    ///
    /// Network-only routes always miss.
    pub fn lookup_request(&self, request_url: &str) -> Result<Option<Vec<u8>>> {
        let route = self.registry.route_for(request_url);
        if !route.strategy.uses_cache() {
            return Ok(None);
        }
        self.backend.get(route.cache_name.as_str(), request_url)
    }

    /// Cache a response for a request URL in the cache its route selects.
    ///
    /// Returns `false` without storing for network-only routes.
    pub fn store_response(&self, request_url: &str, body: &[u8]) -> Result<bool> {
        let route = self.registry.route_for(request_url);
        if !route.strategy.uses_cache() {
            return Ok(false);
        }
        self.store(route.category, request_url, body)?;
        Ok(true)
    }

    /// Delete every cache left behind by another version.
    ///
    /// Returns the number of caches deleted.
    pub fn purge_orphaned_caches(&self) -> Result<usize> {
        let existing = self.backend.namespaces()?;
        let orphans = self.registry.orphaned(existing.iter().map(String::as_str));

        for name in &orphans {
            let removed = self.backend.invalidate_namespace(name)?;
            debug!("Deleted orphaned cache {} ({} entries)", name, removed);
        }
        if !orphans.is_empty() {
            info!(
                "Purged {} orphaned caches for version {}",
                orphans.len(),
                self.registry.current_version()
            );
        }
        Ok(orphans.len())
    }

    /// Drop expired entries across all caches.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.backend.cleanup_expired()
    }
}
