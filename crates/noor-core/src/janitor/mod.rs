//! Storage janitor.
//!
//! Keeps the persistent key-value store bounded and free of entries that
//! belong to a no-longer-active identity. Each invocation scans live state,
//! selects a deletion set, deletes entries one by one and reports a summary.
//! Failures are recorded per entry; no operation here returns an error.

pub mod keys;

use crate::config::JanitorConfig;
use crate::error::NoorError;
use crate::identity::IdentityProvider;
use crate::store::{entry_size, KeyValueStore};
use chrono::{DateTime, Utc};
use keys::{classify, inspect_value, KeyOwner, ValueState};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A failure tied to one key. An empty key marks a store-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupError {
    pub key: String,
    pub reason: String,
}

/// Summary of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    pub entries_scanned: usize,
    pub entries_deleted: usize,
    /// Best-effort estimate of bytes freed.
    pub bytes_reclaimed: u64,
    pub errors: Vec<CleanupError>,
}

impl CleanupResult {
    fn record_error(&mut self, key: &str, err: &NoorError) {
        warn!("Storage cleanup error for '{}': {}", key, err);
        self.errors.push(CleanupError {
            key: key.to_string(),
            reason: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Point-in-time storage usage against the assumed ceiling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub used_bytes: u64,
    pub ceiling_bytes: u64,
    pub usage_percent: f64,
    pub is_near_limit: bool,
    /// Set when the store size could not be read; the usage figures are then zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_error: Option<String>,
}

impl QuotaSnapshot {
    fn compute(used_bytes: u64, ceiling_bytes: u64, near_limit_percent: f64) -> Self {
        let usage_percent = if ceiling_bytes == 0 {
            if used_bytes == 0 {
                0.0
            } else {
                100.0
            }
        } else {
            (used_bytes as f64 * 100.0) / ceiling_bytes as f64
        };

        Self {
            used_bytes,
            ceiling_bytes,
            usage_percent,
            is_near_limit: usage_percent >= near_limit_percent,
            measurement_error: None,
        }
    }

    fn unmeasured(ceiling_bytes: u64, err: &NoorError) -> Self {
        Self {
            used_bytes: 0,
            ceiling_bytes,
            usage_percent: 0.0,
            is_near_limit: false,
            measurement_error: Some(err.to_string()),
        }
    }

    /// Whether the usage figures reflect the store. False after a read failure.
    pub fn is_measured(&self) -> bool {
        self.measurement_error.is_none()
    }
}

/// Why an entry was selected for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    InactiveOwner,
    Expired,
    Malformed,
    Oversized,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reason::InactiveOwner => "owner not active",
            Reason::Expired => "expired",
            Reason::Malformed => "malformed",
            Reason::Oversized => "oversized",
        })
    }
}

struct Candidate {
    key: String,
    reason: Reason,
    size: u64,
}

/// Scans and reclaims the persistent key-value store.
pub struct StorageJanitor {
    store: Arc<dyn KeyValueStore>,
    identity: Arc<dyn IdentityProvider>,
    config: JanitorConfig,
}

impl StorageJanitor {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        identity: Arc<dyn IdentityProvider>,
        config: JanitorConfig,
    ) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Delete every entry owned by `previous_user_id`.
    ///
    /// An empty id is a no-op: the store is not touched.
    pub fn cleanup_for_user(&self, previous_user_id: &str) -> CleanupResult {
        let mut result = CleanupResult::default();
        if previous_user_id.trim().is_empty() {
            return result;
        }

        let Some(keys) = self.scan(&mut result) else {
            return result;
        };

        let candidates: Vec<Candidate> = keys
            .into_iter()
            .filter(|key| classify(key).is_owned_by(previous_user_id))
            .map(|key| {
                let size = self.estimate_size(&key);
                Candidate {
                    key,
                    reason: Reason::InactiveOwner,
                    size,
                }
            })
            .collect();

        self.reclaim(candidates, &mut result);
        info!(
            "Cleaned up {} entries for user {} ({} bytes)",
            result.entries_deleted, previous_user_id, result.bytes_reclaimed
        );
        result
    }

    /// Full scan removing every entry that matches an expiry or orphan rule.
    pub fn run_full_cleanup(&self) -> CleanupResult {
        self.run_full_cleanup_at(Utc::now())
    }

    /// [`run_full_cleanup`](Self::run_full_cleanup) evaluated at a fixed instant.
    pub fn run_full_cleanup_at(&self, now: DateTime<Utc>) -> CleanupResult {
        let mut result = CleanupResult::default();
        let Some(keys) = self.scan(&mut result) else {
            return result;
        };

        let active = self.identity.current_identity();
        let mut candidates = Vec::new();

        for key in keys {
            let owner = classify(&key);
            let value = match self.store.get(&key) {
                Ok(Some(value)) => Some(value),
                // Removed between scan and read.
                Ok(None) => continue,
                Err(e) => {
                    result.record_error(&key, &e);
                    None
                }
            };

            let inactive_owner = match owner {
                KeyOwner::User { user_id, .. } => {
                    active.as_ref().map(|a| a.as_str()) != Some(user_id)
                }
                KeyOwner::Global => false,
            };

            let reason = match &value {
                _ if inactive_owner => Some(Reason::InactiveOwner),
                None => None,
                Some(value) => self.judge(&key, value, now),
            };

            if let Some(reason) = reason {
                let size = value
                    .as_deref()
                    .map(|v| entry_size(&key, v))
                    .unwrap_or(key.len() as u64);
                candidates.push(Candidate { key, reason, size });
            }
        }

        self.reclaim(candidates, &mut result);
        info!(
            "Storage cleanup: scanned {}, deleted {}, reclaimed {} bytes, {} errors",
            result.entries_scanned,
            result.entries_deleted,
            result.bytes_reclaimed,
            result.errors.len()
        );
        result
    }

    /// Current usage against the configured ceiling. Never mutates the store.
    pub fn check_quota_usage(&self) -> QuotaSnapshot {
        let used = match self.store.approximate_size() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to measure storage usage: {}", e);
                return QuotaSnapshot::unmeasured(self.config.quota_ceiling_bytes, &e);
            }
        };
        let snapshot = QuotaSnapshot::compute(
            used,
            self.config.quota_ceiling_bytes,
            self.config.near_limit_percent,
        );
        if snapshot.is_near_limit {
            warn!(
                "Local storage at {:.1}% of {} bytes",
                snapshot.usage_percent, snapshot.ceiling_bytes
            );
        }
        snapshot
    }

    fn scan(&self, result: &mut CleanupResult) -> Option<Vec<String>> {
        match self.store.keys() {
            Ok(keys) => {
                result.entries_scanned = keys.len();
                Some(keys)
            }
            Err(e) => {
                result.record_error("", &e);
                None
            }
        }
    }

    fn judge(&self, key: &str, value: &str, now: DateTime<Utc>) -> Option<Reason> {
        match inspect_value(key, value, now) {
            ValueState::Expired => return Some(Reason::Expired),
            ValueState::Malformed => return Some(Reason::Malformed),
            ValueState::Fresh => {}
        }
        match self.config.max_entry_bytes {
            Some(limit) if entry_size(key, value) > limit => Some(Reason::Oversized),
            _ => None,
        }
    }

    fn estimate_size(&self, key: &str) -> u64 {
        match self.store.get(key) {
            Ok(Some(value)) => entry_size(key, &value),
            _ => key.len() as u64,
        }
    }

    fn reclaim(&self, candidates: Vec<Candidate>, result: &mut CleanupResult) {
        for Candidate { key, reason, size } in candidates {
            match self.store.delete(&key) {
                Ok(true) => {
                    debug!("Reclaimed '{}' ({}, {} bytes)", key, reason, size);
                    result.entries_deleted += 1;
                    result.bytes_reclaimed += size;
                }
                Ok(false) => debug!("'{}' already gone", key),
                Err(e) => result.record_error(&key, &e),
            }
        }
    }
}
