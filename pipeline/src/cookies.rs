//! Cookie jar for the credentialed client.
//!
//! The refresh-token cookie is the only credential that can mint a new access
//! token, so it has to outlive the process the way a browser keeps it across
//! page loads. [`PersistentJar`] keeps cookies in a `cookie_store::CookieStore`
//! and rewrites its [`SnapshotStorage`] record whenever a response sets or
//! expires a cookie. Session-scoped cookies are persisted too; expired ones are
//! dropped on load.

use std::sync::{Arc, PoisonError, RwLock};

use cookie_store::{CookieStore, RawCookie};
use reqwest::Url;
use reqwest::header::HeaderValue;
use tracing::{debug, warn};

use crate::storage::SnapshotStorage;

pub const COOKIES_STORAGE_KEY: &str = "skilltrack_cookies";

pub struct PersistentJar {
    store: RwLock<CookieStore>,
    storage: Arc<dyn SnapshotStorage>,
}

impl PersistentJar {
    /// Jar seeded from the stored record. A missing, unreadable or
    /// unparseable record starts an empty jar.
    #[must_use]
    pub fn load(storage: Arc<dyn SnapshotStorage>) -> Self {
        let store = match storage.read(COOKIES_STORAGE_KEY) {
            Ok(Some(raw)) => cookie_store::serde::json::load(raw.as_bytes()).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unparseable cookie jar");
                CookieStore::default()
            }),
            Ok(None) => CookieStore::default(),
            Err(e) => {
                warn!(error = %e, "cookie jar read failed; starting empty");
                CookieStore::default()
            }
        };
        Self { store: RwLock::new(store), storage }
    }

    /// `Cookie` header value the jar would send to `url`.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let header = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        Some(header)
    }

    fn persist(&self, store: &CookieStore) {
        let mut raw = Vec::new();
        if let Err(e) = cookie_store::serde::json::save_incl_expired_and_nonpersistent(store, &mut raw) {
            warn!(error = %e, "cookie jar serialization failed; keeping previous record");
            return;
        }
        if let Err(e) = self.storage.write(COOKIES_STORAGE_KEY, &String::from_utf8_lossy(&raw)) {
            warn!(error = %e, "cookie jar write failed; keeping previous record");
        }
    }
}

impl reqwest::cookie::CookieStore for PersistentJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| RawCookie::parse(value.to_owned()).ok());

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.store_response_cookies(cookies, url);
        self.persist(&store);
        debug!(host = url.host_str().unwrap_or_default(), "cookie jar updated");
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.header_for(url)?).ok()
    }
}

#[cfg(test)]
#[path = "cookies_test.rs"]
mod tests;
