//! Loading-indicator smoothing.
//!
//! A token refresh is transport plumbing, not a data-loading event. Once a
//! resource has rendered data, a fetch that is parked behind a refresh must
//! not swap that data for a spinner.

use crate::signal::FlagWatch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    /// No fetch has succeeded yet.
    InitialLoading,
    /// At least one fetch succeeded. Never reverts.
    Loaded,
}

/// Stateless form of the smoothing rule.
///
/// Before the first successful load the indicator follows `is_fetching`.
/// After it, a fetch in progress while `refreshing` is set shows no indicator.
#[must_use]
pub fn show_loading_indicator(is_fetching: bool, has_loaded: bool, refreshing: bool) -> bool {
    if has_loaded && refreshing {
        return false;
    }
    is_fetching
}

/// Per-resource smoother that watches the refreshing flag.
///
/// Unlike [`show_loading_indicator`], a fetch seen blocked behind a refresh
/// stays suppressed until it finishes, so the replay that follows the refresh
/// does not flash the indicator either.
pub struct LoadingSmoother {
    refreshing: FlagWatch,
    phase: LoadPhase,
    fetching: bool,
    held: bool,
}

impl LoadingSmoother {
    #[must_use]
    pub fn new(refreshing: FlagWatch) -> Self {
        Self { refreshing, phase: LoadPhase::InitialLoading, fetching: false, held: false }
    }

    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn begin_fetch(&mut self) {
        self.fetching = true;
        self.held = false;
        // A refetch that starts mid-refresh is already blocked behind it.
        self.observe();
    }

    /// End the current fetch. A successful fetch moves the resource to
    /// [`LoadPhase::Loaded`] for good.
    pub fn finish_fetch(&mut self, succeeded: bool) {
        self.fetching = false;
        self.held = false;
        if succeeded {
            self.phase = LoadPhase::Loaded;
        }
    }

    #[must_use]
    pub fn show_loading(&mut self) -> bool {
        self.observe();
        if self.held {
            return false;
        }
        show_loading_indicator(self.fetching, self.phase == LoadPhase::Loaded, self.refreshing.get())
    }

    /// Wait for the refreshing flag to change and return the new indicator.
    /// `None` once the flag's owner is gone.
    pub async fn next_change(&mut self) -> Option<bool> {
        self.refreshing.changed().await?;
        Some(self.show_loading())
    }

    fn observe(&mut self) {
        if self.fetching && self.phase == LoadPhase::Loaded && self.refreshing.get() {
            self.held = true;
        }
    }
}

#[cfg(test)]
#[path = "loading_test.rs"]
mod tests;
