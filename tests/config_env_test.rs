//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, so each test sets what it asserts on and removes it
//! afterwards.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use dice::config::{Config, LogFormat, ResolutionConfig, RevisionConfig};
use serial_test::serial;
use std::env;

fn with_api_key() {
    env::set_var("LANGBASE_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_config_requires_api_key() {
    let saved = env::var("LANGBASE_API_KEY").ok();
    env::remove_var("LANGBASE_API_KEY");

    // a developer .env may still provide the key
    if std::path::Path::new(".env").exists() {
        if let Some(key) = saved {
            env::set_var("LANGBASE_API_KEY", key);
        }
        return;
    }
    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("LANGBASE_API_KEY"));

    if let Some(key) = saved {
        env::set_var("LANGBASE_API_KEY", key);
    }
}

#[test]
#[serial]
fn test_config_from_env_custom_base_url() {
    with_api_key();
    env::set_var("LANGBASE_BASE_URL", "https://custom.api.com");
    env::set_var("LANGBASE_EMBEDDING_MODEL", "openai:text-embedding-3-small");

    let config = Config::from_env().unwrap();
    assert_eq!(config.langbase.base_url, "https://custom.api.com");
    assert_eq!(config.langbase.embedding_model, "openai:text-embedding-3-small");

    env::remove_var("LANGBASE_BASE_URL");
    env::remove_var("LANGBASE_EMBEDDING_MODEL");
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    with_api_key();
    env::set_var("DATABASE_PATH", "/custom/dice.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/dice.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    with_api_key();
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    with_api_key();
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    env::remove_var("REQUEST_TIMEOUT_MS");
    env::remove_var("MAX_RETRIES");
    env::remove_var("RETRY_DELAY_MS");
}

#[test]
#[serial]
fn test_config_from_env_pipe_names() {
    with_api_key();
    env::set_var("PIPE_EXTRACTION", "custom-extraction");
    env::set_var("PIPE_CLASSIFICATION", "custom-classifier");

    let config = Config::from_env().unwrap();
    assert_eq!(config.pipes.extraction, "custom-extraction");
    assert_eq!(config.pipes.classification, "custom-classifier");
    assert_eq!(config.pipes.bakeoff, "dice-entity-bakeoff-v1");

    env::remove_var("PIPE_EXTRACTION");
    env::remove_var("PIPE_CLASSIFICATION");
}

#[test]
#[serial]
fn test_config_from_env_resolution_overrides() {
    env::set_var("RESOLUTION_FUZZY_MIN_LENGTH", "6");
    env::set_var("RESOLUTION_VECTOR_AUTO_ACCEPT_THRESHOLD", "0.99");
    env::set_var("RESOLUTION_HEURISTIC_ONLY", "TRUE");
    env::set_var("RESOLUTION_TEXT_TOP_K", "not-a-number");

    let config = ResolutionConfig::from_env();
    assert_eq!(config.fuzzy_min_length, 6);
    assert!((config.vector_auto_accept_threshold - 0.99).abs() < 1e-9);
    assert!(config.heuristic_only);
    // malformed values fall back to the default
    assert_eq!(config.text_top_k, ResolutionConfig::default().text_top_k);

    env::remove_var("RESOLUTION_FUZZY_MIN_LENGTH");
    env::remove_var("RESOLUTION_VECTOR_AUTO_ACCEPT_THRESHOLD");
    env::remove_var("RESOLUTION_HEURISTIC_ONLY");
    env::remove_var("RESOLUTION_TEXT_TOP_K");
}

#[test]
#[serial]
fn test_config_from_env_revision_overrides() {
    with_api_key();
    env::set_var("REVISION_MIN_SIMILARITY", "0.65");
    env::set_var("REVISION_TOP_K", "8");

    let config = Config::from_env().unwrap();
    assert!((config.revision.min_similarity - 0.65).abs() < 1e-9);
    assert_eq!(config.revision.top_k, 8);
    assert!(
        (config.revision.auto_merge_threshold - RevisionConfig::default().auto_merge_threshold)
            .abs()
            < 1e-9
    );

    env::remove_var("REVISION_MIN_SIMILARITY");
    env::remove_var("REVISION_TOP_K");
}
