use super::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_lock()` so no other test mutates these keys.
unsafe fn clear_pipeline_env() {
    unsafe {
        std::env::remove_var("SKILLTRACK_API_URL");
        std::env::remove_var("SKILLTRACK_STATE_DIR");
        std::env::remove_var("SKILLTRACK_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("SKILLTRACK_CONNECT_TIMEOUT_SECS");
    }
}

// =============================================================================
// from_env
// =============================================================================

#[test]
fn from_env_defaults() {
    let _env = env_lock();
    unsafe { clear_pipeline_env() };

    let cfg = PipelineConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    assert_eq!(cfg.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    assert_eq!(cfg.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_lock();
    unsafe {
        clear_pipeline_env();
        std::env::set_var("SKILLTRACK_API_URL", "https://skills.example.test/");
        std::env::set_var("SKILLTRACK_STATE_DIR", "/var/lib/skilltrack");
        std::env::set_var("SKILLTRACK_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("SKILLTRACK_CONNECT_TIMEOUT_SECS", "7");
    }

    let cfg = PipelineConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://skills.example.test");
    assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/skilltrack"));
    assert_eq!(cfg.request_timeout_secs, 42);
    assert_eq!(cfg.connect_timeout_secs, 7);

    unsafe { clear_pipeline_env() };
}

#[test]
fn from_env_rejects_non_http_url() {
    let _env = env_lock();
    unsafe {
        clear_pipeline_env();
        std::env::set_var("SKILLTRACK_API_URL", "ftp://skills.example.test");
    }

    let err = PipelineConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));

    unsafe { clear_pipeline_env() };
}

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__SKILLTRACK_TEST_MISSING__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_invalid_returns_default() {
    unsafe { std::env::set_var("__SKILLTRACK_TEST_INVALID__", "soon") };
    let val: u64 = env_parse("__SKILLTRACK_TEST_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__SKILLTRACK_TEST_INVALID__") };
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn new_trims_trailing_slash() {
    assert_eq!(PipelineConfig::new("http://localhost:8080/").api_url, "http://localhost:8080");
}

#[test]
fn validate_rejects_bare_scheme() {
    assert!(matches!(PipelineConfig::new("http://").validate(), Err(ConfigError::InvalidBaseUrl(_))));
}

#[test]
fn validate_rejects_empty_state_dir() {
    let mut cfg = PipelineConfig::new("http://localhost:8080");
    cfg.state_dir = PathBuf::new();
    assert!(matches!(cfg.validate(), Err(ConfigError::EmptyStateDir)));
}
