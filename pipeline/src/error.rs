//! Error types for the request pipeline.
//!
//! DESIGN
//! ======
//! `TransportError` means no HTTP status was obtained and is the only kind
//! that flips the reachability marker. `ApiError` is what typed call sites
//! see once a status has been classified.

// =============================================================================
// TRANSPORT
// =============================================================================

/// Failure to obtain an HTTP status from the API server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The request or connect deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read to completion.
    #[error("response body read failed: {0}")]
    Body(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else if e.is_builder() {
            Self::ClientBuild(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Failure to read or write a persisted snapshot.
///
/// Never escapes a session mutation; see [`crate::storage::save_json`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// CONFIG
// =============================================================================

/// Invalid pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The API base URL is not an `http://` or `https://` URL.
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    /// The state directory is empty.
    #[error("state directory must not be empty")]
    EmptyStateDir,

    /// The HTTP transport could not be built from the config.
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

// =============================================================================
// API
// =============================================================================

/// Errors surfaced to typed call sites such as [`crate::Client::fetch_json`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server could not be reached; the reachability marker is now down.
    #[error("service unreachable: {0}")]
    Unreachable(#[from] TransportError),

    /// The request was rejected with `401` and the session could not be refreshed.
    #[error("not authorized; session has ended")]
    Unauthorized,

    /// The server answered with a non-success status other than `401`.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("API response parse failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation requires a signed-in user.
    #[error("no authenticated user")]
    NotAuthenticated,
}

impl ApiError {
    /// Stable machine-readable code for logs and UI error mapping.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "E_UNREACHABLE",
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Status { .. } => "E_API_STATUS",
            Self::Decode(_) => "E_API_PARSE",
            Self::NotAuthenticated => "E_NOT_AUTHENTICATED",
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
