//! Key naming convention and per-entry staleness rules.
//!
//! Owned keys have the shape `<dataKind>:<userId>:<entityId>` with non-empty
//! kind and user segments; the entity id may itself contain `:`. Every other
//! key is global and is never removed by per-user cleanup.

use crate::config::StorageConfig;
use crate::error::{NoorError, Result};
use crate::identity::UserId;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Who a stored entry belongs to, recovered from its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOwner<'a> {
    Global,
    User {
        data_kind: &'a str,
        user_id: &'a str,
        entity_id: &'a str,
    },
}

impl<'a> KeyOwner<'a> {
    pub fn user_id(&self) -> Option<&'a str> {
        match self {
            KeyOwner::Global => None,
            KeyOwner::User { user_id, .. } => Some(user_id),
        }
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.user_id() == Some(user)
    }
}

/// Classify a key as global or owned.
pub fn classify(key: &str) -> KeyOwner<'_> {
    let mut parts = key.splitn(3, StorageConfig::KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(data_kind), Some(user_id), Some(entity_id))
            if !data_kind.is_empty() && !user_id.is_empty() =>
        {
            KeyOwner::User {
                data_kind,
                user_id,
                entity_id,
            }
        }
        _ => KeyOwner::Global,
    }
}

/// Build an owned key, e.g. `dhikr-session:u1:subhanallah`.
///
/// The data kind must be non-empty and free of the separator; the user id is
/// separator-free by construction.
pub fn owned_key(data_kind: &str, user: &UserId, entity_id: &str) -> Result<String> {
    let sep = StorageConfig::KEY_SEPARATOR;
    if data_kind.is_empty() || data_kind.contains(sep) {
        return Err(NoorError::Validation {
            field: "data_kind".to_string(),
            message: format!("'{}' is not a valid data kind", data_kind),
        });
    }
    Ok(format!("{data_kind}{sep}{user}{sep}{entity_id}"))
}

/// First key segment, the whole key when it has no separator.
pub fn data_kind(key: &str) -> &str {
    key.split(StorageConfig::KEY_SEPARATOR)
        .next()
        .unwrap_or(key)
}

/// Session markers are entries whose data kind is `session` or ends in `-session`.
pub fn is_session_marker(key: &str) -> bool {
    let kind = data_kind(key);
    kind == StorageConfig::SESSION_KIND
        || kind
            .strip_suffix(StorageConfig::SESSION_KIND)
            .is_some_and(|prefix| prefix.ends_with('-'))
}

/// Result of inspecting one entry's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    Fresh,
    Expired,
    Malformed,
}

/// Inspect a value against the expiry and session-marker rules.
///
/// Any JSON object with an `expiresAt` in the past is expired. Session
/// markers must be JSON objects with a readable `expiresAt` when present;
/// anything else is malformed. Other entries are opaque and stay fresh.
pub fn inspect_value(key: &str, value: &str, now: DateTime<Utc>) -> ValueState {
    let marker = is_session_marker(key);
    let parsed = serde_json::from_str::<Value>(value).ok();

    let object = match parsed {
        Some(Value::Object(object)) => object,
        _ if marker => return ValueState::Malformed,
        _ => return ValueState::Fresh,
    };

    match object.get(StorageConfig::EXPIRES_AT_FIELD) {
        None => ValueState::Fresh,
        Some(raw) => match parse_expiry(raw) {
            Some(expires_at) if expires_at <= now => ValueState::Expired,
            Some(_) => ValueState::Fresh,
            None if marker => ValueState::Malformed,
            None => ValueState::Fresh,
        },
    }
}

/// `expiresAt` may be an RFC 3339 string or epoch milliseconds.
fn parse_expiry(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
