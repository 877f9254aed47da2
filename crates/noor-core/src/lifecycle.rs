//! Triggers for the storage janitor.
//!
//! - On mount: one full cleanup, deferred by a short delay so it never blocks
//!   first render. Tearing the view down before the delay elapses cancels it.
//! - On identity change: synchronous per-user cleanup of the stale identity.

use crate::cancel::CancellationToken;
use crate::identity::{IdentityProvider, IdentityTransition, SubscriptionId};
use crate::janitor::{CleanupResult, StorageJanitor};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Wires a [`StorageJanitor`] to application lifecycle events.
#[derive(Clone)]
pub struct StorageLifecycle {
    janitor: Arc<StorageJanitor>,
}

impl StorageLifecycle {
    pub fn new(janitor: Arc<StorageJanitor>) -> Self {
        Self { janitor }
    }

    pub fn janitor(&self) -> &Arc<StorageJanitor> {
        &self.janitor
    }

    /// Schedule the initial full cleanup on the current tokio runtime.
    ///
    /// The cleanup runs after `initial_cleanup_delay` unless the returned
    /// guard is cancelled or dropped first.
    pub fn on_mount(&self) -> MountGuard {
        let janitor = Arc::clone(&self.janitor);
        let delay = janitor.config().initial_cleanup_delay;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    debug!("Initial storage cleanup cancelled before it started");
                    None
                }
                _ = tokio::time::sleep(delay) => {
                    if task_token.is_cancelled() {
                        return None;
                    }
                    Some(janitor.run_full_cleanup())
                }
            }
        });

        MountGuard {
            token,
            handle: Some(handle),
        }
    }

    /// Run `cleanup_for_user` whenever `provider` reports a stale identity.
    ///
    /// The subscription holds the janitor weakly and goes quiet once the
    /// janitor is dropped.
    pub fn watch_identity<P>(&self, provider: &P) -> SubscriptionId
    where
        P: IdentityProvider + ?Sized,
    {
        let janitor: Weak<StorageJanitor> = Arc::downgrade(&self.janitor);
        provider.on_identity_change(Arc::new(move |transition: &IdentityTransition| {
            let Some(stale) = transition.stale_identity() else {
                return;
            };
            let Some(janitor) = janitor.upgrade() else {
                return;
            };
            let result = janitor.cleanup_for_user(stale.as_str());
            info!(
                "Identity change cleanup for {}: {} entries deleted",
                stale, result.entries_deleted
            );
        }))
    }
}

/// Owns the deferred initial cleanup of one mounted view.
///
/// Dropping the guard cancels a cleanup that has not started yet.
pub struct MountGuard {
    token: CancellationToken,
    handle: Option<JoinHandle<Option<CleanupResult>>>,
}

impl MountGuard {
    /// Cancel the pending cleanup.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the deferred cleanup. `None` when it was cancelled.
    pub async fn finished(mut self) -> Option<CleanupResult> {
        let handle = self.handle.take()?;
        handle.await.ok().flatten()
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}
