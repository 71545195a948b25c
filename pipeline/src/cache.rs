//! Query cache keyed by entity identity.
//!
//! Reads store their decoded JSON under a [`QueryKey`]; mutations declare the
//! keys they affect and the cache marks those entries stale. Stale entries stay
//! readable through [`QueryCache::get`] so already-rendered data does not
//! vanish, but [`QueryCache::get_fresh`] ignores them and forces a refetch.
//! Cached lists are never patched in place.
//!
//! A read that was in flight while its kind was invalidated (or the cache
//! cleared) must not land as fresh. Readers take a [`Ticket`] before fetching
//! and store through [`QueryCache::put_if_current`], which drops the write if
//! any invalidation touched the key's kind in between.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Skill,
    User,
    JobRole,
    Test,
    Document,
    Analytics,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skill => "skills",
            Self::User => "users",
            Self::JobRole => "job-roles",
            Self::Test => "tests",
            Self::Document => "documents",
            Self::Analytics => "analytics",
        }
    }
}

/// Addresses one entity (`id = Some`) or the collection of a kind (`id = None`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: EntityKind,
    pub id: Option<String>,
}

impl QueryKey {
    #[must_use]
    pub fn collection(kind: EntityKind) -> Self {
        Self { kind, id: None }
    }

    #[must_use]
    pub fn entity(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: Some(id.into()) }
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.id.is_none()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{id}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

struct Entry {
    value: Value,
    stale: bool,
}

/// Invalidation generation observed before a fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    kind: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    /// Bumped by `clear`.
    epoch: u64,
    /// Bumped per kind by `invalidate` and `invalidate_kind`.
    kinds: HashMap<EntityKind, u64>,
}

impl State {
    fn ticket(&self, kind: EntityKind) -> Ticket {
        Ticket { epoch: self.epoch, kind: self.kinds.get(&kind).copied().unwrap_or(0) }
    }

    fn bump(&mut self, kind: EntityKind) {
        *self.kinds.entry(kind).or_insert(0) += 1;
    }
}

#[derive(Default)]
pub struct QueryCache {
    state: Mutex<State>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `key`, stale or not.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.state().entries.get(key).map(|e| e.value.clone())
    }

    /// Cached value for `key` unless it has been invalidated.
    #[must_use]
    pub fn get_fresh(&self, key: &QueryKey) -> Option<Value> {
        self.state().entries.get(key).filter(|e| !e.stale).map(|e| e.value.clone())
    }

    #[must_use]
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.state().entries.get(key).is_some_and(|e| !e.stale)
    }

    /// Current invalidation generation for `key`. Take it before fetching.
    #[must_use]
    pub fn ticket(&self, key: &QueryKey) -> Ticket {
        self.state().ticket(key.kind)
    }

    /// Store `value` as the fresh result for `key`.
    pub fn put(&self, key: QueryKey, value: Value) {
        self.state().entries.insert(key, Entry { value, stale: false });
    }

    /// Store `value` only if nothing invalidated `key` since `ticket` was
    /// taken. Returns whether the value was stored.
    pub fn put_if_current(&self, key: QueryKey, ticket: Ticket, value: Value) -> bool {
        let mut state = self.state();
        if state.ticket(key.kind) != ticket {
            debug!(%key, "discarding response fetched before invalidation");
            return false;
        }
        state.entries.insert(key, Entry { value, stale: false });
        true
    }

    /// Mark `key` stale. Invalidating an entity also invalidates the collection
    /// of its kind, since the list may embed the changed entity.
    pub fn invalidate(&self, key: &QueryKey) {
        let mut state = self.state();
        state.bump(key.kind);
        if let Some(entry) = state.entries.get_mut(key) {
            entry.stale = true;
        }
        if !key.is_collection() {
            if let Some(entry) = state.entries.get_mut(&QueryKey::collection(key.kind)) {
                entry.stale = true;
            }
        }
        debug!(%key, "query invalidated");
    }

    /// Mark every entry of `kind` stale.
    pub fn invalidate_kind(&self, kind: EntityKind) {
        let mut state = self.state();
        state.bump(kind);
        for (_, entry) in state.entries.iter_mut().filter(|(k, _)| k.kind == kind) {
            entry.stale = true;
        }
        debug!(kind = kind.as_str(), "query kind invalidated");
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.epoch += 1;
        state.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
