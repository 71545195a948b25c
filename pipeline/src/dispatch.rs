//! Request dispatcher: the single entry point for API calls.
//!
//! DESIGN
//! ======
//! [`Client::dispatch`] attaches the current bearer token, sends the request,
//! and classifies the outcome:
//!
//! - no status: the service is marked unreachable and the transport error is
//!   returned unchanged; no refresh is attempted.
//! - 2xx: the unreachable marker is cleared.
//! - refresh endpoint: a 401 clears the session, a 2xx stores the new access
//!   token exactly as a coordinated refresh would. Either way the response is
//!   returned and no refresh cycle is started.
//! - 401 elsewhere: the request joins (or starts) the shared refresh cycle and
//!   is replayed once with the token current after the refresh settles. If the
//!   refresh failed, the original 401 is returned.
//!
//! Login and logout bypass the refresh protocol: a 401 from either is an
//! answer about credentials, not about an expired access token.
//!
//! Cloning a `Client` is cheap; clones share the session, refresh slot,
//! reachability marker, and query cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::config::PipelineConfig;
use crate::error::{ApiError, ConfigError, TransportError};
use crate::refresh::{RefreshCoordinator, RefreshOutcome, TokenRefresher};
use crate::session::SessionStore;
use crate::signal::{BroadcastFlag, FlagWatch};
use crate::storage::FileStorage;
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    ApiRequest, ApiResponse, Identity, LOGIN_PATH, LOGOUT_PATH, LoginRequest, LoginResponse, ME_PATH,
    PERMISSIONS_PATH, PermissionsResponse, REFRESH_PATH, RefreshResponse,
};

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    coordinator: RefreshCoordinator,
    /// `true` while the last round-trip obtained a status.
    reachable: BroadcastFlag,
    cache: QueryCache,
}

impl Client {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                session,
                coordinator: RefreshCoordinator::new(),
                reachable: BroadcastFlag::new(true),
                cache: QueryCache::new(),
            }),
        }
    }

    /// Client over reqwest with the session persisted under `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the HTTP client cannot be
    /// built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = HttpTransport::new(config)?;
        let storage = Arc::new(FileStorage::new(config.state_dir.clone()));
        let session = Arc::new(SessionStore::load(storage));
        Ok(Self::new(Arc::new(transport), session))
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Observe whether a token refresh is in flight.
    #[must_use]
    pub fn refreshing(&self) -> FlagWatch {
        self.inner.coordinator.refreshing()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Observe service reachability (`false` after a request got no status).
    #[must_use]
    pub fn reachability(&self) -> FlagWatch {
        self.inner.reachable.watch()
    }

    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.get()
    }

    /// Refresh cycles started by this client.
    #[must_use]
    pub fn refresh_cycles(&self) -> u64 {
        self.inner.coordinator.cycles()
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Send `request` with the current token, recovering from an expired
    /// access token through the shared refresh cycle.
    ///
    /// Any HTTP status, including an unrecovered 401, is `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request (or its replay) obtained no
    /// status.
    pub async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let inner = &self.inner;
        let bearer = inner.session.access_token();
        let response = inner.send(request, bearer.as_deref()).await?;
        if request.is_refresh() {
            inner.adopt_refresh(&response);
            return Ok(response);
        }
        if !response.is_unauthorized() {
            return Ok(response);
        }

        // A refresh may have settled between our send and the 401.
        let current = inner.session.access_token();
        if current.is_some() && current != bearer && !inner.coordinator.is_refreshing() {
            debug!(path = %request.path, "replaying with token issued meanwhile");
            return inner.send(request, current.as_deref()).await;
        }

        debug!(path = %request.path, "access token rejected; awaiting refresh");
        match inner.coordinator.refresh(Arc::clone(inner)).await {
            RefreshOutcome::Refreshed => {
                let token = inner.session.access_token();
                inner.send(request, token.as_deref()).await
            }
            RefreshOutcome::Failed => Ok(response),
        }
    }

    /// Dispatch and decode a 2xx body into `T`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] for a 401 that survived the refresh cycle,
    /// [`ApiError::Status`] for any other non-2xx, [`ApiError::Unreachable`]
    /// without a status, [`ApiError::Decode`] for an unexpected body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.dispatch(request).await?;
        decode(response)
    }

    /// Serve `key` from the cache when fresh, otherwise fetch and cache it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch_json`]. Failed fetches leave the cache untouched.
    /// A response whose key was invalidated while it was in flight is returned
    /// but not cached.
    pub async fn query<T: DeserializeOwned>(&self, key: &QueryKey, request: &ApiRequest) -> Result<T, ApiError> {
        let cache = &self.inner.cache;
        if let Some(cached) = cache.get_fresh(key) {
            debug!(%key, "query cache hit");
            return Ok(serde_json::from_value(cached)?);
        }
        let ticket = cache.ticket(key);
        let value: Value = self.fetch_json(request).await?;
        let typed = serde_json::from_value(value.clone())?;
        cache.put_if_current(key.clone(), ticket, value);
        Ok(typed)
    }

    /// Dispatch a write and invalidate every key in `affects` once it succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch_json`]. Nothing is invalidated on failure.
    pub async fn mutate<T: DeserializeOwned>(&self, request: &ApiRequest, affects: &[QueryKey]) -> Result<T, ApiError> {
        let value: Value = self.fetch_json(request).await?;
        for key in affects {
            self.inner.cache.invalidate(key);
        }
        Ok(serde_json::from_value(value)?)
    }

    // =========================================================================
    // AUTH FLOWS
    // =========================================================================

    /// Exchange credentials for an access token and store the signed-in user.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] for rejected credentials; otherwise as
    /// [`Self::fetch_json`].
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let body = serde_json::to_value(LoginRequest { email, password })?;
        let request = ApiRequest::post(LOGIN_PATH, Some(body)).with_credentials();
        let response = self.inner.send(&request, None).await?;
        let login: LoginResponse = decode(response)?;

        self.inner.cache.clear();
        let session = &self.inner.session;
        session.set_tokens(login.access_token);
        session.set_user(login.user.clone());
        session.set_permissions(login.permissions);
        info!(user_id = %login.user.id, "signed in");
        Ok(login.user)
    }

    /// Revoke the server session best-effort, then clear local state.
    /// Preferences survive.
    pub async fn logout(&self) {
        let token = self.inner.session.access_token();
        let request = ApiRequest::post(LOGOUT_PATH, None).with_credentials();
        match self.inner.send(&request, token.as_deref()).await {
            Ok(response) if response.is_success() => debug!("server session revoked"),
            Ok(response) => warn!(status = response.status, "server logout rejected; clearing local session anyway"),
            Err(_) => {}
        }
        self.inner.end_session();
        info!("signed out");
    }

    /// Re-fetch the signed-in user.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotAuthenticated`] without an access token; otherwise as
    /// [`Self::fetch_json`].
    pub async fn sync_profile(&self) -> Result<Identity, ApiError> {
        if self.inner.session.access_token().is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        let user: Identity = self.fetch_json(&ApiRequest::get(ME_PATH)).await?;
        self.inner.session.set_user(user.clone());
        Ok(user)
    }

    /// Re-fetch the signed-in user's permissions.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotAuthenticated`] without a signed-in user; otherwise as
    /// [`Self::fetch_json`].
    pub async fn sync_permissions(&self) -> Result<usize, ApiError> {
        if !self.inner.session.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }
        let body: PermissionsResponse = self.fetch_json(&ApiRequest::get(PERMISSIONS_PATH)).await?;
        let count = body.permissions.len();
        self.inner.session.set_permissions(body.permissions);
        Ok(count)
    }

    /// Start or join a refresh cycle, e.g. to restore a session from the
    /// refresh cookie at startup.
    pub async fn refresh_session(&self) -> RefreshOutcome {
        self.inner.coordinator.refresh(Arc::clone(&self.inner)).await
    }
}

impl Inner {
    /// One round-trip, with reachability bookkeeping.
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, TransportError> {
        match self.transport.send(request, bearer).await {
            Ok(response) => {
                if response.is_success() && self.reachable.set(true) {
                    info!("service reachable again");
                }
                Ok(response)
            }
            Err(e) => {
                warn!(method = request.method.as_str(), path = %request.path, error = %e, "request got no response");
                if self.reachable.set(false) {
                    warn!("service marked unreachable");
                }
                Err(e)
            }
        }
    }

    /// Apply a refresh response obtained outside the coordinator.
    fn adopt_refresh(&self, response: &ApiResponse) {
        if response.is_unauthorized() {
            warn!("refresh endpoint rejected the session; signing out");
            self.end_session();
        } else if response.is_success() {
            match response.json::<RefreshResponse>() {
                Ok(body) => {
                    self.session.set_tokens(body.access_token);
                    debug!("stored access token from direct refresh call");
                }
                Err(e) => warn!(error = %e, "malformed refresh response; keeping current token"),
            }
        }
    }

    fn end_session(&self) {
        self.session.logout();
        self.cache.clear();
    }
}

#[async_trait]
impl TokenRefresher for Inner {
    async fn refresh_token(&self) -> RefreshOutcome {
        let request = ApiRequest::post(REFRESH_PATH, None).with_credentials();
        let reason = match self.send(&request, None).await {
            Ok(response) if response.is_success() => match response.json::<RefreshResponse>() {
                Ok(body) => {
                    self.session.set_tokens(body.access_token);
                    return RefreshOutcome::Refreshed;
                }
                Err(e) => format!("malformed refresh response: {e}"),
            },
            Ok(response) => format!("refresh rejected with status {}", response.status),
            Err(e) => format!("refresh got no response: {e}"),
        };
        warn!(%reason, "token refresh failed; signing out");
        self.end_session();
        RefreshOutcome::Failed
    }
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T, ApiError> {
    if response.is_unauthorized() {
        return Err(ApiError::Unauthorized);
    }
    if !response.is_success() {
        let body = match response.body {
            Value::Null => String::new(),
            Value::String(text) => text,
            other => other.to_string(),
        };
        return Err(ApiError::Status { status: response.status, body });
    }
    Ok(response.json()?)
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
