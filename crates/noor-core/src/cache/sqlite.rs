//! SQLite-based response cache.

use super::traits::{CacheBackend, CacheEntry, CacheMeta, CacheStats};
use crate::error::{NoorError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based cache backend.
///
/// All versioned caches share one database; the namespace column isolates
/// them. Thread-safe via internal mutex on the connection.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Create a new cache at the specified database path.
    ///
    /// Creates the database and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NoorError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| NoorError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| NoorError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Create a private in-memory cache.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            -- id doubles as insertion order for FIFO eviction
            CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                cached_at_ms INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                UNIQUE (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(expires_at_ms);

            CREATE INDEX IF NOT EXISTS idx_cache_namespace_order
                ON cache_entries(namespace, id);
            "#,
        )
        .map_err(|e| NoorError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(NoorError::lock_poisoned)
    }

    /// Evict the oldest entries of `namespace` beyond `max_entries`.
    fn enforce_bound(conn: &Connection, namespace: &str, max_entries: NonZeroU32) -> Result<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;

        let excess = count - i64::from(max_entries.get());
        if excess <= 0 {
            return Ok(0);
        }

        let evicted = conn
            .execute(
                r#"
                DELETE FROM cache_entries WHERE id IN (
                    SELECT id FROM cache_entries
                    WHERE namespace = ?1
                    ORDER BY id ASC
                    LIMIT ?2
                )
                "#,
                params![namespace, excess],
            )
            .map_err(|e| NoorError::Database {
                message: format!("Failed to evict cache entries: {}", e),
                source: Some(e),
            })?;

        debug!(
            "Evicted {} oldest entries from '{}' (max {})",
            evicted, namespace, max_entries
        );
        Ok(evicted)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl CacheBackend for SqliteCache {
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let now_ms = Utc::now().timestamp_millis();

        let row: Option<(Vec<u8>, i64, i64, i64)> = conn
            .query_row(
                r#"
                SELECT value, cached_at_ms, expires_at_ms, size_bytes
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at_ms > ?3
                "#,
                params![namespace, key, now_ms],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| NoorError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        Ok(row.map(|(value, cached_at, expires_at, size_bytes)| CacheEntry {
            value,
            cached_at: from_millis(cached_at),
            expires_at: from_millis(expires_at),
            size_bytes: size_bytes.max(0) as u64,
        }))
    }

    fn put_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
        max_entries: Option<NonZeroU32>,
    ) -> Result<usize> {
        let conn = self.lock()?;
        let now_ms = Utc::now().timestamp_millis();

        // REPLACE deletes the old row, so an overwrite gets a fresh id.
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, value, cached_at_ms, expires_at_ms, size_bytes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                namespace,
                key,
                value,
                now_ms,
                expires_at.timestamp_millis(),
                value.len() as i64
            ],
        )
        .map_err(|e| NoorError::Database {
            message: format!("Failed to set cache entry: {}", e),
            source: Some(e),
        })?;

        match max_entries {
            Some(max) => Self::enforce_bound(&conn, namespace, max),
            None => Ok(0),
        }
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| NoorError::Database {
                message: format!("Failed to invalidate cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| NoorError::Database {
                message: format!("Failed to invalidate namespace: {}", e),
                source: Some(e),
            })?;

        debug!(
            "Invalidated {} entries from namespace '{}'",
            deleted, namespace
        );
        Ok(deleted)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT namespace FROM cache_entries ORDER BY namespace")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT namespace, COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM cache_entries
                GROUP BY namespace
                ORDER BY namespace
                "#,
            )
            .map_err(|e| NoorError::Database {
                message: format!("Failed to prepare namespace stats query: {}", e),
                source: Some(e),
            })?;

        let namespaces = stmt
            .query_map([], |row| {
                let entry_count: i64 = row.get(1)?;
                let total_size_bytes: i64 = row.get(2)?;
                Ok(CacheMeta {
                    namespace: row.get(0)?,
                    entry_count: entry_count as usize,
                    total_size_bytes: total_size_bytes as u64,
                })
            })?
            .collect::<std::result::Result<Vec<CacheMeta>, _>>()?;

        Ok(CacheStats {
            total_entries: namespaces.iter().map(|m| m.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|m| m.total_size_bytes).sum(),
            namespace_count: namespaces.len(),
            namespaces,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let now_ms = Utc::now().timestamp_millis();
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at_ms <= ?1",
                params![now_ms],
            )
            .map_err(|e| NoorError::Database {
                message: format!("Failed to cleanup expired entries: {}", e),
                source: Some(e),
            })?;

        if deleted > 0 {
            debug!("Cleaned up {} expired cache entries", deleted);
        }
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| NoorError::Database {
                message: format!("Failed to clear cache entries: {}", e),
                source: Some(e),
            })?;
        debug!("Cleared all cache data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn create_test_cache() -> (TempDir, SqliteCache) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_cache.sqlite");
        let cache = SqliteCache::new(&db_path).unwrap();
        (temp_dir, cache)
    }

    fn bound(n: u32) -> Option<NonZeroU32> {
        NonZeroU32::new(n)
    }

    #[test]
    fn test_put_and_get() {
        let (_temp, cache) = create_test_cache();
        cache
            .put("api-v1", "/api/dhikrs", b"[]", HOUR, None)
            .unwrap();

        assert_eq!(cache.get("api-v1", "/api/dhikrs").unwrap().unwrap(), b"[]");
        assert!(cache.get("api-v2", "/api/dhikrs").unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_are_not_served() {
        let cache = SqliteCache::in_memory().unwrap();
        let past = Utc::now() - chrono::Duration::seconds(1);
        cache
            .put_with_expiry("api-v1", "old", b"data", past, None)
            .unwrap();

        assert!(cache.get("api-v1", "old").unwrap().is_none());
        assert!(!cache.is_valid("api-v1", "old").unwrap());
        assert_eq!(cache.cleanup_expired().unwrap(), 1);
    }

    #[test]
    fn test_fifo_eviction_past_bound() {
        let cache = SqliteCache::in_memory().unwrap();
        for key in ["a", "b", "c"] {
            cache.put("audio-v1", key, b"x", HOUR, bound(2)).unwrap();
        }

        assert!(cache.get("audio-v1", "a").unwrap().is_none());
        assert!(cache.get("audio-v1", "b").unwrap().is_some());
        assert!(cache.get("audio-v1", "c").unwrap().is_some());
    }

    #[test]
    fn test_reinsert_becomes_newest() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.put("images-v1", "a", b"1", HOUR, bound(2)).unwrap();
        cache.put("images-v1", "b", b"2", HOUR, bound(2)).unwrap();
        cache.put("images-v1", "a", b"3", HOUR, bound(2)).unwrap();
        let evicted = cache.put("images-v1", "c", b"4", HOUR, bound(2)).unwrap();

        assert_eq!(evicted, 1);
        assert!(cache.get("images-v1", "b").unwrap().is_none());
        assert_eq!(cache.get("images-v1", "a").unwrap().unwrap(), b"3");
    }

    #[test]
    fn test_bound_is_per_namespace() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.put("api-v1", "a", b"1", HOUR, bound(1)).unwrap();
        cache.put("static-v1", "a", b"1", HOUR, bound(1)).unwrap();

        assert!(cache.is_valid("api-v1", "a").unwrap());
        assert!(cache.is_valid("static-v1", "a").unwrap());
    }

    #[test]
    fn test_invalidate_and_namespaces() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.put("ns1", "key1", b"data1", HOUR, None).unwrap();
        cache.put("ns1", "key2", b"data2", HOUR, None).unwrap();
        cache.put("ns2", "key1", b"data3", HOUR, None).unwrap();

        assert!(cache.invalidate("ns1", "key1").unwrap());
        assert!(!cache.invalidate("ns1", "key1").unwrap());
        assert_eq!(cache.namespaces().unwrap(), vec!["ns1", "ns2"]);

        assert_eq!(cache.invalidate_namespace("ns1").unwrap(), 1);
        assert_eq!(cache.namespaces().unwrap(), vec!["ns2"]);
    }

    #[test]
    fn test_stats() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.put("ns1", "key1", b"12345", HOUR, None).unwrap();
        cache.put("ns1", "key2", b"67890", HOUR, None).unwrap();
        cache.put("ns2", "key1", b"abcde", HOUR, None).unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 15);
        assert_eq!(stats.namespace_count, 2);
        assert_eq!(stats.namespaces[0].entry_count, 2);

        cache.clear_all().unwrap();
        assert_eq!(cache.get_stats().unwrap().total_entries, 0);
    }
}
