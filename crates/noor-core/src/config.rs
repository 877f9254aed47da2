//! Centralized configuration for the Noor offline core.
//!
//! Compile-time constants live on unit structs grouped by concern. Values an
//! operator may override at runtime live on [`JanitorConfig`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Build and version stamping.
pub struct BuildConfig;

impl BuildConfig {
    /// Environment variable holding the raw build identifier (commit hash).
    pub const BUILD_ID_ENV: &'static str = "NOOR_BUILD_ID";
    /// Build identifier used when no pipeline value is available.
    pub const DEV_BUILD_ID: &'static str = "dev";
    /// Number of build-id characters kept in the version token.
    pub const BUILD_ID_PREFIX_LEN: usize = 8;
    /// `chrono` format for the timestamp half of the version token.
    pub const TIMESTAMP_FORMAT: &'static str = "%Y%m%d%H%M%S";
}

/// Local storage limits and cleanup timing.
pub struct StorageConfig;

impl StorageConfig {
    /// Assumed storage ceiling for the browser key-value store (5 MiB).
    pub const QUOTA_CEILING_BYTES: u64 = 5 * 1024 * 1024;
    /// Usage percentage at which the quota is reported as near its limit.
    pub const NEAR_LIMIT_PERCENT: f64 = 80.0;
    /// Delay between mount and the initial full cleanup.
    pub const INITIAL_CLEANUP_DELAY: Duration = Duration::from_millis(1000);
    /// Separator between key segments in `<dataKind>:<userId>:<entityId>`.
    pub const KEY_SEPARATOR: char = ':';
    /// Data kind marking a session entry (also matched as a `-session` suffix).
    pub const SESSION_KIND: &'static str = "session";
    /// JSON field carrying an entry's expiry.
    pub const EXPIRES_AT_FIELD: &'static str = "expiresAt";
}

/// Network-first timeouts per request class.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const API_TIMEOUT: Duration = Duration::from_millis(3000);
    pub const NAVIGATION_TIMEOUT: Duration = Duration::from_millis(5000);
    pub const ASSET_TIMEOUT: Duration = Duration::from_millis(10000);
}

/// Service worker template placeholders.
pub struct ServiceWorkerConfig;

impl ServiceWorkerConfig {
    pub const VERSION_PLACEHOLDER: &'static str = "__SW_VERSION__";
    pub const MANIFEST_PLACEHOLDER: &'static str = "__CACHE_MANIFEST__";
    /// Hex characters of the SHA-256 digest kept as the content hash.
    pub const CONTENT_HASH_LEN: usize = 16;
}

/// Runtime configuration for the storage janitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct JanitorConfig {
    /// Assumed storage ceiling used for quota percentages.
    pub quota_ceiling_bytes: u64,
    /// Percentage at or above which the quota is near its limit.
    pub near_limit_percent: f64,
    /// Entries larger than this are reclaimed by a full cleanup (None = no limit).
    pub max_entry_bytes: Option<u64>,
    /// Delay before the initial cleanup after mount.
    #[serde(with = "duration_millis")]
    pub initial_cleanup_delay: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            quota_ceiling_bytes: StorageConfig::QUOTA_CEILING_BYTES,
            near_limit_percent: StorageConfig::NEAR_LIMIT_PERCENT,
            max_entry_bytes: None,
            initial_cleanup_delay: StorageConfig::INITIAL_CLEANUP_DELAY,
        }
    }
}

impl JanitorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the assumed storage ceiling.
    pub fn with_quota_ceiling(mut self, bytes: u64) -> Self {
        self.quota_ceiling_bytes = bytes;
        self
    }

    /// Set the per-entry size limit enforced by full cleanups.
    pub fn with_max_entry_bytes(mut self, bytes: u64) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    /// Set the deferred cleanup delay.
    pub fn with_initial_cleanup_delay(mut self, delay: Duration) -> Self {
        self.initial_cleanup_delay = delay;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
