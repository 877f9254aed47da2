//! Active user identity and change notifications.
//!
//! The authentication provider itself lives outside this crate. It reports
//! sessions through [`IdentityHub::set_identity`]; cleanup logic subscribes
//! with [`IdentityProvider::on_identity_change`] and never depends on a UI
//! framework's re-render cycle.

use crate::config::StorageConfig;
use crate::error::{NoorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Identifier of an authenticated user.
///
/// Never empty and never contains the key separator, so it always round-trips
/// through the `<dataKind>:<userId>:<entityId>` key convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NoorError::Validation {
                field: "user_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if id.contains(StorageConfig::KEY_SEPARATOR) {
            return Err(NoorError::Validation {
                field: "user_id".to_string(),
                message: format!(
                    "must not contain the key separator '{}'",
                    StorageConfig::KEY_SEPARATOR
                ),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = NoorError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// One observed change of the active identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTransition {
    pub previous: Option<UserId>,
    pub current: Option<UserId>,
}

impl IdentityTransition {
    /// Identity whose local data must be cleaned after this transition.
    ///
    /// Some when the previous identity existed and either differs from the new
    /// one (switch) or the new one is absent (logout). Logins from an
    /// anonymous state and refreshes of the same identity yield `None`.
    pub fn stale_identity(&self) -> Option<&UserId> {
        match (&self.previous, &self.current) {
            (Some(previous), Some(current)) if previous != current => Some(previous),
            (Some(previous), None) => Some(previous),
            _ => None,
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked on every identity transition.
pub type IdentityHandler = Arc<dyn Fn(&IdentityTransition) + Send + Sync>;

/// Read-only view of the active session plus change notifications.
pub trait IdentityProvider: Send + Sync {
    /// The active identity, `None` when logged out.
    fn current_identity(&self) -> Option<UserId>;

    /// Register a handler for identity transitions.
    fn on_identity_change(&self, handler: IdentityHandler) -> SubscriptionId;

    /// Detach a handler. Returns whether it was registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// In-process identity provider.
///
/// Handlers run synchronously on the thread calling `set_identity`, in
/// subscription order, after the new identity is visible to readers.
#[derive(Default)]
pub struct IdentityHub {
    current: RwLock<Option<UserId>>,
    handlers: Mutex<Vec<(SubscriptionId, IdentityHandler)>>,
    next_id: AtomicU64,
}

impl IdentityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub with an already-known session.
    pub fn with_identity(identity: Option<UserId>) -> Self {
        Self {
            current: RwLock::new(identity),
            ..Self::default()
        }
    }

    /// Record the identity reported by the session provider.
    ///
    /// Returns the transition, or `None` when the identity did not change
    /// (no handlers are invoked in that case).
    pub fn set_identity(&self, identity: Option<UserId>) -> Option<IdentityTransition> {
        let transition = {
            let mut current = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!("Identity lock poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            if *current == identity {
                return None;
            }
            let previous = std::mem::replace(&mut *current, identity.clone());
            IdentityTransition {
                previous,
                current: identity,
            }
        };

        debug!(
            "Identity changed: {:?} -> {:?}",
            transition.previous.as_ref().map(UserId::as_str),
            transition.current.as_ref().map(UserId::as_str)
        );

        // Snapshot handlers so callbacks may subscribe or unsubscribe freely.
        let handlers: Vec<IdentityHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(_, h)| Arc::clone(h))
                .collect(),
        };
        for handler in handlers {
            handler(&transition);
        }

        Some(transition)
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl IdentityProvider for IdentityHub {
    fn current_identity(&self) -> Option<UserId> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn on_identity_change(&self, handler: IdentityHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push((id, handler)),
            Err(poisoned) => poisoned.into_inner().push((id, handler)),
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = match self.handlers.lock() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }
}
