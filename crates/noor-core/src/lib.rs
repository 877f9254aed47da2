//! Noor Core - offline cache versioning and local storage hygiene.
//!
//! This crate holds the client-side offline layer of the Noor devotional app:
//! - [`CacheRegistry`]: build-scoped cache names, retention policies and the
//!   per-route caching strategy table
//! - [`StorageJanitor`]: reclaims stale, orphaned and foreign-user entries from
//!   the persistent key-value store and reports quota usage
//! - [`ResponseCache`]: versioned response storage honouring those policies
//! - [`StorageLifecycle`]: runs the janitor on mount and on identity change
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use noor_core::{BuildVersion, CacheRegistry, IdentityHub, JanitorConfig,
//!     MemoryStore, StorageJanitor, StorageLifecycle};
//!
//! let registry = CacheRegistry::new(BuildVersion::from_env()?);
//! println!("{}", registry.strategy_for("/api/dhikrs?page=2"));
//!
//! let hub = Arc::new(IdentityHub::new());
//! let janitor = StorageJanitor::new(Arc::new(MemoryStore::new()), hub.clone(),
//!     JanitorConfig::default());
//! let lifecycle = StorageLifecycle::new(Arc::new(janitor));
//! lifecycle.watch_identity(hub.as_ref());
//! let _mount = lifecycle.on_mount();
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod identity;
pub mod janitor;
pub mod lifecycle;
pub mod registry;
pub mod store;
pub mod sw;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheEntry, CacheMeta, CacheStats, ResponseCache, SqliteCache};
pub use cancel::{CancellationToken, CancelledError};
pub use config::JanitorConfig;
pub use error::{NoorError, Result};
pub use identity::{IdentityHub, IdentityProvider, IdentityTransition, SubscriptionId, UserId};
pub use janitor::{CleanupError, CleanupResult, QuotaSnapshot, StorageJanitor};
pub use lifecycle::{MountGuard, StorageLifecycle};
pub use registry::{
    BuildVersion, CacheCategory, CacheManifest, CacheName, CachePolicy, CacheRegistry,
    ResolvedRoute, Strategy,
};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sw::{render_service_worker, render_service_worker_file, RenderedWorker};
