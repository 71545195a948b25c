//! Single-flight token refresh coordination.
//!
//! DESIGN
//! ======
//! The coordinator owns one slot holding the in-flight refresh, if any. The
//! first caller to find the slot empty fills it and spawns the refresh task;
//! every later caller clones the pending receiver out of the slot and awaits
//! the same outcome. The slot is only touched under its mutex, so two
//! refreshes can never be in flight at once.
//!
//! The refresh runs in its own task: dropping the future of the caller that
//! started it does not cancel it, since other callers may be waiting on it.
//!
//! ORDERING
//! ========
//! The refresher updates the session before returning. The task then clears
//! the slot, lowers the refreshing flag, and only then publishes the outcome,
//! so no waiter replays before the new token is in place and a 401 observed
//! after the publish starts a fresh cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::signal::{BroadcastFlag, FlagWatch};

/// How a refresh cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token is in the session store.
    Refreshed,
    /// The refresh was rejected or never reached the server; the session has
    /// been cleared.
    Failed,
}

/// Performs the refresh-endpoint call and applies its result to the session.
#[async_trait]
pub(crate) trait TokenRefresher: Send + Sync + 'static {
    async fn refresh_token(&self) -> RefreshOutcome;
}

type Pending = watch::Receiver<Option<RefreshOutcome>>;
type Slot = Arc<Mutex<Option<Pending>>>;

pub(crate) struct RefreshCoordinator {
    slot: Slot,
    refreshing: Arc<BroadcastFlag>,
    cycles: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self { slot: Arc::new(Mutex::new(None)), refreshing: Arc::new(BroadcastFlag::new(false)), cycles: AtomicU64::new(0) }
    }

    /// Read-only view of the refreshing flag.
    pub(crate) fn refreshing(&self) -> FlagWatch {
        self.refreshing.watch()
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        self.refreshing.get()
    }

    /// Number of refresh cycles started so far.
    pub(crate) fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Join the in-flight refresh, or start one with `refresher`, and wait
    /// for it to settle.
    pub(crate) async fn refresh<R: TokenRefresher>(&self, refresher: Arc<R>) -> RefreshOutcome {
        let mut pending = self.join_or_start(refresher);
        let outcome = match pending.wait_for(Option::is_some).await {
            Ok(settled) => *settled,
            // The task went away without publishing (panicked refresher).
            Err(_) => None,
        };
        outcome.unwrap_or(RefreshOutcome::Failed)
    }

    fn join_or_start<R: TokenRefresher>(&self, refresher: Arc<R>) -> Pending {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.as_ref() {
            debug!("joining in-flight token refresh");
            return pending.clone();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        self.refreshing.set(true);
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        info!(cycle, "token refresh started");

        let in_flight = InFlight { slot: Arc::clone(&self.slot), refreshing: Arc::clone(&self.refreshing) };
        tokio::spawn(async move {
            let outcome = refresher.refresh_token().await;
            drop(in_flight);
            info!(cycle, ?outcome, "token refresh settled");
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

/// Clears the slot and lowers the refreshing flag when the refresh task
/// finishes, including by panic.
struct InFlight {
    slot: Slot,
    refreshing: Arc<BroadcastFlag>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        self.refreshing.set(false);
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
