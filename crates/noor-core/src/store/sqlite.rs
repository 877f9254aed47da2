//! SQLite-backed key-value store.

use super::{entry_size, KeyValueStore};
use crate::error::{NoorError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Durable key-value store in a single SQLite table.
///
/// Thread-safe via internal mutex on the connection. Entry sizes are stored
/// alongside values so quota checks are one aggregate query.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the specified database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NoorError::Io {
                message: format!("Failed to create storage directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| NoorError::Database {
            message: format!("Failed to open storage database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| NoorError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| NoorError::Database {
            message: format!("Failed to initialize storage schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(NoorError::lock_poisoned)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| NoorError::storage(key, format!("Failed to read entry: {}", e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO kv_entries (key, value, size_bytes, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![key, value, entry_size(key, value) as i64, now],
        )
        .map_err(|e| NoorError::storage(key, format!("Failed to write entry: {}", e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .map_err(|e| NoorError::storage(key, format!("Failed to delete entry: {}", e)))?;
        if deleted > 0 {
            debug!("Deleted storage entry '{}'", key);
        }
        Ok(deleted > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries ORDER BY key")
            .map_err(|e| NoorError::Database {
                message: format!("Failed to prepare key scan: {}", e),
                source: Some(e),
            })?;

        let keys = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| NoorError::Database {
                message: format!("Failed to scan keys: {}", e),
                source: Some(e),
            })?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    fn approximate_size(&self) -> Result<u64> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM kv_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}
