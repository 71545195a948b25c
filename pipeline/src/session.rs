//! Session store: access token, identity, and permissions.
//!
//! DESIGN
//! ======
//! The current [`Session`] lives in a `watch` channel so UI consumers can
//! subscribe to changes instead of polling. Every mutation is synchronous and
//! is followed by a best-effort snapshot write; persistence failures are
//! logged and never surface to the caller.
//!
//! Presentation [`Preferences`] are persisted under their own key and are
//! untouched by [`SessionStore::logout`].
//!
//! Writers: the dispatcher (login, profile/permission sync, logout) and the
//! refresh coordinator (new token, or logout on refresh failure).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::storage::{PREFERENCES_STORAGE_KEY, SESSION_STORAGE_KEY, SnapshotStorage, load_json, save_json};
use crate::types::{Identity, PermissionName, Session};

/// Display preferences that survive logout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub dark_mode: bool,
}

pub struct SessionStore {
    state: watch::Sender<Session>,
    preferences: Mutex<Preferences>,
    storage: Arc<dyn SnapshotStorage>,
    // Serializes mutate-then-persist so snapshots are written in mutation order.
    persist: Mutex<()>,
}

impl SessionStore {
    /// Empty session; nothing is read from `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn SnapshotStorage>) -> Self {
        Self::from_parts(Session::default(), Preferences::default(), storage)
    }

    /// Rehydrate from the persisted snapshot. A missing or unparseable record
    /// yields an empty session.
    #[must_use]
    pub fn load(storage: Arc<dyn SnapshotStorage>) -> Self {
        let mut session: Session = load_json(storage.as_ref(), SESSION_STORAGE_KEY).unwrap_or_default();
        session.normalize();
        let preferences: Preferences = load_json(storage.as_ref(), PREFERENCES_STORAGE_KEY).unwrap_or_default();
        debug!(authenticated = session.is_authenticated(), "session rehydrated");
        Self::from_parts(session, preferences, storage)
    }

    fn from_parts(session: Session, preferences: Preferences, storage: Arc<dyn SnapshotStorage>) -> Self {
        let (state, _rx) = watch::channel(session);
        Self { state, preferences: Mutex::new(preferences), storage, persist: Mutex::new(()) }
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Copy of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<Identity> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn permissions(&self) -> BTreeSet<PermissionName> {
        self.state.borrow().permissions.clone()
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.state.borrow().has_permission(name)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Observe session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    // =========================================================================
    // MUTATE
    // =========================================================================

    pub fn set_tokens(&self, access_token: impl Into<String>) {
        let token = access_token.into();
        self.mutate(move |s| s.access_token = Some(token));
    }

    pub fn set_user(&self, user: Identity) {
        self.mutate(move |s| s.user = Some(user));
    }

    /// Replace the permission set. Ignored while no user is signed in.
    pub fn set_permissions(&self, permissions: impl IntoIterator<Item = PermissionName>) {
        if self.state.borrow().user.is_none() {
            warn!("ignoring permission update without a signed-in user");
            return;
        }
        let permissions: BTreeSet<_> = permissions.into_iter().collect();
        self.mutate(move |s| s.permissions = permissions);
    }

    /// Set or clear the signed-in user's avatar. No-op without a user.
    pub fn update_avatar(&self, avatar_id: Option<String>) {
        self.mutate(move |s| {
            if let Some(user) = s.user.as_mut() {
                user.avatar_id = avatar_id;
            }
        });
    }

    /// Clear token, user, and permissions. Preferences are kept.
    pub fn logout(&self) {
        self.mutate(|s| *s = Session::default());
    }

    fn mutate(&self, apply: impl FnOnce(&mut Session)) {
        let _guard = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.send_modify(|session| {
            apply(session);
            session.normalize();
        });
        let snapshot = self.state.borrow().clone();
        save_json(self.storage.as_ref(), SESSION_STORAGE_KEY, &snapshot);
    }

    // =========================================================================
    // PREFERENCES
    // =========================================================================

    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.preferences.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        let mut prefs = self.preferences.lock().unwrap_or_else(PoisonError::into_inner);
        prefs.dark_mode = enabled;
        save_json(self.storage.as_ref(), PREFERENCES_STORAGE_KEY, &*prefs);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
