//! Authenticated request pipeline for the skill tracker API.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every data-fetching call site goes through [`Client::dispatch`]. The client
//! attaches the current bearer token from the [`SessionStore`], classifies the
//! outcome, and on a `401` hands control to the refresh coordinator, which
//! issues at most one `POST /api/auth/refresh` no matter how many requests
//! fail at once, then replays each of them with the new token.
//!
//! UI consumers read three things and never write them: the refreshing flag
//! ([`Client::refreshing`]), the reachability marker ([`Client::reachability`])
//! and the session itself ([`SessionStore::subscribe`]). [`LoadingSmoother`]
//! turns the refreshing flag into a flicker-free loading indicator.

pub mod cache;
pub mod config;
pub mod cookies;
pub mod dispatch;
pub mod error;
pub mod loading;
pub mod refresh;
pub mod session;
pub mod signal;
pub mod storage;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cache::{EntityKind, QueryCache, QueryKey, Ticket};
pub use config::PipelineConfig;
pub use cookies::PersistentJar;
pub use dispatch::Client;
pub use error::{ApiError, ConfigError, StorageError, TransportError};
pub use loading::{LoadPhase, LoadingSmoother, show_loading_indicator};
pub use refresh::RefreshOutcome;
pub use session::{Preferences, SessionStore};
pub use signal::FlagWatch;
pub use storage::{FileStorage, MemoryStorage, SnapshotStorage};
pub use transport::{HttpTransport, Transport};
pub use types::{ApiRequest, ApiResponse, Identity, Method, PermissionName, Session};
