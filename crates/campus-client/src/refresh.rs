//! Single-flight coordination of access-token refreshes.
//!
//! The first caller to hit a 401 becomes the leader and performs the
//! refresh. Everyone arriving while it is in flight becomes a follower and
//! waits on a `watch` channel for the leader's outcome.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

type OutcomeRx = watch::Receiver<Option<RefreshOutcome>>;

/// Result of a refresh attempt, shared with every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token was issued.
    Renewed(String),
    /// The refresh was rejected or failed; stored auth has been cleared.
    Failed,
    /// The leading task was cancelled before it finished.
    Abandoned,
}

/// Gate allowing at most one refresh in flight.
#[derive(Debug, Default)]
pub struct RefreshGate {
    slot: Mutex<Option<OutcomeRx>>,
}

enum Role {
    Leader(watch::Sender<Option<RefreshOutcome>>),
    Follower(OutcomeRx),
}

/// Empties the in-flight slot when the leader finishes or is dropped.
struct SlotGuard<'a> {
    gate: &'a RefreshGate,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.gate.lock().take();
    }
}

impl RefreshGate {
    /// Creates an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OutcomeRx>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` while a refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs `refresh` unless one is already in flight, in which case the
    /// caller waits for that one instead. Every caller receives the same
    /// outcome.
    pub async fn run<F, Fut>(&self, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        let role = {
            let mut slot = self.lock();
            if let Some(rx) = slot.as_ref() {
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Leader(tx) => {
                let guard = SlotGuard { gate: self };
                let outcome = refresh().await;
                tx.send_replace(Some(outcome.clone()));
                drop(guard);
                outcome
            }
            Role::Follower(mut rx) => {
                debug!("Waiting for in-flight token refresh");
                match rx.wait_for(Option::is_some).await {
                    Ok(value) => (*value).clone().unwrap_or(RefreshOutcome::Abandoned),
                    // Leader dropped without publishing
                    Err(_) => RefreshOutcome::Abandoned,
                }
            }
        }
    }
}
