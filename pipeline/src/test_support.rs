//! Shared fixtures for unit tests: a scripted API server and a storage backend
//! that rejects every write.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::error::{StorageError, TransportError};
use crate::storage::SnapshotStorage;
use crate::transport::Transport;
use crate::types::{
    ApiRequest, ApiResponse, Identity, LOGIN_PATH, LOGOUT_PATH, ME_PATH, Method, PERMISSIONS_PATH,
};

pub(crate) const PASSWORD: &str = "correct horse";

pub(crate) fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_owned(),
        email: format!("{id}@skills.test"),
        name: format!("User {id}"),
        avatar_id: None,
        job_role_id: None,
    }
}

fn identity_json(id: &str) -> Value {
    json!({ "id": id, "email": format!("{id}@skills.test"), "name": format!("User {id}") })
}

// =============================================================================
// FailingStorage
// =============================================================================

/// Reads find nothing; every write fails as if the quota were exhausted.
#[derive(Default)]
pub(crate) struct FailingStorage {
    writes: AtomicUsize,
}

impl FailingStorage {
    pub(crate) fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotStorage for FailingStorage {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn write(&self, _key: &str, _raw: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io(io::Error::other("quota exceeded")))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

// =============================================================================
// ScriptedTransport
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefreshBehavior {
    /// Issue `token-N` for the next N.
    Rotate,
    /// Answer 401, as for an expired or revoked refresh cookie.
    Reject,
    /// Fail without a status.
    Unreachable,
}

/// One request as the server saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Seen {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub with_credentials: bool,
}

struct ServerState {
    valid_token: Option<String>,
    issued: u32,
    refresh: RefreshBehavior,
    offline: bool,
    seen: Vec<Seen>,
}

/// In-memory API server. Accepts exactly one access token at a time; any other
/// bearer (or none) gets a 401 on protected paths.
pub(crate) struct ScriptedTransport {
    state: Mutex<ServerState>,
    refresh_gate: watch::Sender<bool>,
    unauthorized: watch::Sender<usize>,
    refresh_calls: AtomicUsize,
    /// GETs to this path park until it is cleared.
    held_reads: watch::Sender<Option<String>>,
    parked: watch::Sender<usize>,
}

impl ScriptedTransport {
    /// Server accepting `token-1`, with refresh rotating tokens.
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ServerState {
                valid_token: Some("token-1".to_owned()),
                issued: 1,
                refresh: RefreshBehavior::Rotate,
                offline: false,
                seen: Vec::new(),
            }),
            refresh_gate: watch::channel(true).0,
            unauthorized: watch::channel(0).0,
            refresh_calls: AtomicUsize::new(0),
            held_reads: watch::channel(None).0,
            parked: watch::channel(0).0,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting the current access token.
    pub(crate) fn expire_token(&self) {
        self.state().valid_token = None;
    }

    pub(crate) fn valid_token(&self) -> Option<String> {
        self.state().valid_token.clone()
    }

    pub(crate) fn set_refresh(&self, behavior: RefreshBehavior) {
        self.state().refresh = behavior;
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Park refresh calls until [`Self::release_refresh`].
    pub(crate) fn hold_refresh(&self) {
        self.refresh_gate.send_replace(false);
    }

    pub(crate) fn release_refresh(&self) {
        self.refresh_gate.send_replace(true);
    }

    /// Park GETs to `path` until [`Self::release_reads`]. A parked request is
    /// answered as the server saw it on arrival.
    pub(crate) fn hold_reads(&self, path: &str) {
        self.held_reads.send_replace(Some(path.to_owned()));
    }

    pub(crate) fn release_reads(&self) {
        self.held_reads.send_replace(None);
    }

    /// Resolve once at least `count` GETs have parked.
    pub(crate) async fn wait_for_parked(&self, count: usize) {
        let mut rx = self.parked.subscribe();
        let _ = rx.wait_for(|parked| *parked >= count).await;
    }

    async fn park(&self, request: &ApiRequest) {
        if request.method != Method::Get {
            return;
        }
        let mut held = self.held_reads.subscribe();
        if held.borrow().as_deref() != Some(request.path.as_str()) {
            return;
        }
        self.parked.send_modify(|parked| *parked += 1);
        let _ = held.wait_for(|path| path.as_deref() != Some(request.path.as_str())).await;
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Seen> {
        self.state().seen.clone()
    }

    pub(crate) fn seen_on(&self, path: &str) -> Vec<Seen> {
        self.state().seen.iter().filter(|s| s.path == path).cloned().collect()
    }

    /// Resolve once at least `count` 401s have been served on protected paths.
    pub(crate) async fn wait_for_unauthorized(&self, count: usize) {
        let mut rx = self.unauthorized.subscribe();
        let _ = rx.wait_for(|served| *served >= count).await;
    }

    fn reject(&self) -> ApiResponse {
        self.unauthorized.send_modify(|served| *served += 1);
        ApiResponse::new(401, json!({ "error": "token expired" }))
    }

    fn issue_token(state: &mut ServerState) -> String {
        state.issued += 1;
        let token = format!("token-{}", state.issued);
        state.valid_token = Some(token.clone());
        token
    }

    async fn refresh(&self) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.refresh_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let mut state = self.state();
        match state.refresh {
            RefreshBehavior::Rotate => {
                let token = Self::issue_token(&mut state);
                Ok(ApiResponse::new(200, json!({ "accessToken": token })))
            }
            RefreshBehavior::Reject => {
                state.valid_token = None;
                Ok(ApiResponse::new(401, json!({ "error": "refresh token revoked" })))
            }
            RefreshBehavior::Unreachable => Err(TransportError::Connect("connection reset".to_owned())),
        }
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let password = request.body.as_ref().and_then(|b| b.get("password")).and_then(Value::as_str);
        if password != Some(PASSWORD) {
            return ApiResponse::new(401, json!({ "error": "invalid credentials" }));
        }
        let token = Self::issue_token(&mut self.state());
        ApiResponse::new(
            200,
            json!({
                "accessToken": token,
                "user": identity_json("u1"),
                "permissions": ["skills.read", "skills.write"],
            }),
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, TransportError> {
        let (offline, authorized) = {
            let mut state = self.state();
            state.seen.push(Seen {
                method: request.method,
                path: request.path.clone(),
                bearer: bearer.map(str::to_owned),
                with_credentials: request.with_credentials,
            });
            (state.offline, bearer.is_some() && state.valid_token.as_deref() == bearer)
        };
        self.park(request).await;

        if offline {
            return Err(TransportError::Connect("connection refused".to_owned()));
        }
        if request.is_refresh() {
            return self.refresh().await;
        }
        if request.path == LOGIN_PATH {
            return Ok(self.login(request));
        }
        // Rejects every bearer, including freshly refreshed ones.
        if !authorized || request.path == "/api/revoked" {
            return Ok(self.reject());
        }

        let response = match request.path.as_str() {
            ME_PATH => ApiResponse::new(200, identity_json("u1")),
            PERMISSIONS_PATH => ApiResponse::new(200, json!({ "permissions": ["skills.read", "analytics.view"] })),
            LOGOUT_PATH => {
                self.state().valid_token = None;
                ApiResponse::new(204, Value::Null)
            }
            "/api/missing" => ApiResponse::new(404, json!({ "error": "not found" })),
            path => ApiResponse::new(
                200,
                json!({ "path": path, "token": bearer, "body": request.body.clone().unwrap_or(Value::Null) }),
            ),
        };
        Ok(response)
    }
}
