//! Broadcast booleans with a single writer and many read-only observers.
//!
//! DESIGN
//! ======
//! Backed by `tokio::sync::watch`. The writer half stays private to the
//! component that owns the state (the refresh coordinator for the refreshing
//! flag, the dispatcher for reachability); everything else gets a
//! [`FlagWatch`], which can read and await transitions but not write.

use tokio::sync::watch;

/// Writer half of a broadcast boolean.
#[derive(Debug)]
pub(crate) struct BroadcastFlag {
    tx: watch::Sender<bool>,
}

impl BroadcastFlag {
    pub(crate) fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Set the flag. Observers are only woken on an actual transition.
    /// Returns whether the value changed.
    pub(crate) fn set(&self, value: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }

    pub(crate) fn get(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> FlagWatch {
        FlagWatch { rx: self.tx.subscribe() }
    }
}

/// Read-only observer of a broadcast boolean.
#[derive(Debug, Clone)]
pub struct FlagWatch {
    rx: watch::Receiver<bool>,
}

impl FlagWatch {
    /// Current value.
    #[must_use]
    pub fn get(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next transition and return the new value, or `None` once
    /// the writer has gone away and no further transition can happen.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Wait until the flag equals `value`. Returns immediately if it already does.
    pub async fn wait_for(&mut self, value: bool) {
        let _ = self.rx.wait_for(|current| *current == value).await;
    }
}

#[cfg(test)]
#[path = "signal_test.rs"]
mod tests;
