//! HTTP transport seam.
//!
//! The dispatcher only knows [`Transport`]; [`HttpTransport`] is the reqwest
//! implementation used in production and tests substitute a scripted server.
//!
//! `HttpTransport` holds two reqwest clients. Ordinary calls go through one
//! without cookies; calls marked `with_credentials` (login, refresh, logout) go
//! through one backed by a [`PersistentJar`], so the refresh cookie set at
//! login is still there in the next process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::cookies::PersistentJar;
use crate::error::TransportError;
use crate::storage::{FileStorage, SnapshotStorage};
use crate::types::{ApiRequest, ApiResponse, Method};

/// Sends one request and reports the status, or fails without one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, attaching `Authorization: Bearer <bearer>` when given.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no HTTP status was obtained.
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, TransportError>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

pub struct HttpTransport {
    base_url: String,
    /// Cookie-less client for ordinary API calls.
    http: reqwest::Client,
    /// Client carrying the cookie jar (refresh-token cookie).
    credentialed: reqwest::Client,
    jar: Arc<PersistentJar>,
}

impl HttpTransport {
    /// Build both clients with the configured timeouts. Cookies persist under
    /// `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if reqwest rejects the settings.
    pub fn new(config: &PipelineConfig) -> Result<Self, TransportError> {
        Self::with_cookie_storage(config, Arc::new(FileStorage::new(config.state_dir.clone())))
    }

    /// Like [`Self::new`], with the cookie jar kept in `storage`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if reqwest rejects the settings.
    pub fn with_cookie_storage(
        config: &PipelineConfig,
        storage: Arc<dyn SnapshotStorage>,
    ) -> Result<Self, TransportError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;
        let jar = Arc::new(PersistentJar::load(storage));
        let credentialed = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self { base_url: config.api_url.clone(), http, credentialed, jar })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn cookie_jar(&self) -> &PersistentJar {
        &self.jar
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, TransportError> {
        let client = if request.with_credentials { &self.credentialed } else { &self.http };
        let url = join_url(&self.base_url, &request.path);

        let mut builder = client.request(reqwest_method(request.method), url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Empty bodies become `Null`; bodies that are not JSON are kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
