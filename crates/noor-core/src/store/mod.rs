//! Persistent key-value store capability.
//!
//! The storage janitor only ever sees this trait, so it runs unchanged
//! against the SQLite-backed store used by the CLI and the in-memory store
//! used by tests and embedders.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// Synchronous, local-only string key-value store.
///
/// Implementations use interior mutability so one store can be shared
/// behind an `Arc` between the janitor and the rest of the application.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Returns whether an entry existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Every key currently stored.
    fn keys(&self) -> Result<Vec<String>>;

    /// Approximate bytes consumed by all entries.
    ///
    /// The default sums [`entry_size`] over every readable entry.
    fn approximate_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                total += entry_size(&key, &value);
            }
        }
        Ok(total)
    }
}

/// Approximate footprint of one entry: UTF-8 bytes of key plus value.
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }

    fn approximate_size(&self) -> Result<u64> {
        (**self).approximate_size()
    }
}
