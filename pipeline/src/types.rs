//! Request/response envelopes and session DTOs.
//!
//! DESIGN
//! ======
//! Bodies stay `serde_json::Value` at the pipeline boundary; call sites decode
//! into their own entity types. Field names on the wire are camelCase to match
//! the API server and the persisted snapshot layout.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";
pub const PERMISSIONS_PATH: &str = "/api/auth/permissions";

// =============================================================================
// REQUEST
// =============================================================================

/// HTTP verbs used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A replayable API request. The bearer token is not part of the request; it
/// is attached at send time so a replay picks up the current token.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute path on the API server, e.g. `/api/skills`.
    pub path: String,
    pub body: Option<Value>,
    /// Send the cookie jar (refresh-token cookie) with this request.
    pub with_credentials: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, with_credentials: false }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self { body, ..Self::new(Method::Post, path) }
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::Put, path) }
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::Patch, path) }
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_credentials(mut self) -> Self {
        self.with_credentials = true;
        self
    }

    /// Whether this is the refresh-endpoint call, which never enters the
    /// refresh protocol itself.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.path.split('?').next() == Some(REFRESH_PATH)
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A response for which the server produced an HTTP status.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Name of a permission granted to the signed-in user (e.g. `"skills:edit"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(pub String);

impl PermissionName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PermissionName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The authenticated user as returned by `/api/auth/me`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Stored avatar image identifier, if the user uploaded one.
    #[serde(default)]
    pub avatar_id: Option<String>,
    #[serde(default)]
    pub job_role_id: Option<String>,
}

/// Client-side session record. This is also the persisted snapshot layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: Option<String>,
    pub user: Option<Identity>,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionName>,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == name)
    }

    /// Drop permissions held without a user so a rehydrated or mutated
    /// session never violates the user/permission pairing.
    pub(crate) fn normalize(&mut self) {
        if self.user.is_none() {
            self.permissions.clear();
        }
    }
}

// =============================================================================
// AUTH WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub access_token: String,
    pub user: Identity,
    #[serde(default)]
    pub permissions: Vec<PermissionName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PermissionsResponse {
    pub permissions: Vec<PermissionName>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
