use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub resolution: ResolutionConfig,
    pub revision: RevisionConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
    /// Embedding model passed to the embed endpoint
    pub embedding_model: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub extraction: String,
    pub verification: String,
    pub bakeoff: String,
    pub agentic_search: String,
    pub classification: String,
}

/// Entity resolution tuning.
///
/// Each searcher reads its own thresholds; nothing here is shared with
/// [`RevisionConfig`].
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Maximum edit distance as a fraction of the shorter name
    pub fuzzy_max_distance_ratio: f64,
    /// Names shorter than this never fuzzy-match
    pub fuzzy_min_length: usize,
    /// Results requested from the store's text search
    pub text_top_k: usize,
    /// Minimum score for text search results
    pub text_threshold: f64,
    /// Results requested from the store's vector search
    pub vector_top_k: usize,
    /// Minimum similarity for a vector result to become a candidate
    pub vector_candidate_threshold: f64,
    /// Similarity at which a unique vector result is accepted outright
    pub vector_auto_accept_threshold: f64,
    /// Skip LLM arbitration entirely
    pub heuristic_only: bool,
    /// Tool-use rounds granted to the agentic searcher
    pub agentic_max_steps: usize,
    /// Timeout applied to each LLM call made during resolution
    pub llm_timeout_ms: u64,
}

/// Proposition revision tuning
#[derive(Debug, Clone)]
pub struct RevisionConfig {
    /// Minimum vector similarity for a stored proposition to be a candidate
    pub min_similarity: f64,
    /// Candidates retrieved per proposition
    pub top_k: usize,
    /// Similarity at which the top candidate is merged without the LLM
    pub auto_merge_threshold: f64,
    /// Timeout applied to each classification call
    pub llm_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            embedding_model: env::var("LANGBASE_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "openai:text-embedding-3-large".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/dice.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            extraction: env::var("PIPE_EXTRACTION")
                .unwrap_or_else(|_| "dice-extraction-v1".to_string()),
            verification: env::var("PIPE_VERIFICATION")
                .unwrap_or_else(|_| "dice-entity-verification-v1".to_string()),
            bakeoff: env::var("PIPE_BAKEOFF")
                .unwrap_or_else(|_| "dice-entity-bakeoff-v1".to_string()),
            agentic_search: env::var("PIPE_AGENTIC_SEARCH")
                .unwrap_or_else(|_| "dice-agentic-search-v1".to_string()),
            classification: env::var("PIPE_CLASSIFICATION")
                .unwrap_or_else(|_| "dice-proposition-classifier-v1".to_string()),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            resolution: ResolutionConfig::from_env(),
            revision: RevisionConfig::from_env(),
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ResolutionConfig {
    /// Load resolution tuning, defaulting each missing value.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fuzzy_max_distance_ratio: env_or(
                "RESOLUTION_FUZZY_MAX_DISTANCE_RATIO",
                d.fuzzy_max_distance_ratio,
            ),
            fuzzy_min_length: env_or("RESOLUTION_FUZZY_MIN_LENGTH", d.fuzzy_min_length),
            text_top_k: env_or("RESOLUTION_TEXT_TOP_K", d.text_top_k),
            text_threshold: env_or("RESOLUTION_TEXT_THRESHOLD", d.text_threshold),
            vector_top_k: env_or("RESOLUTION_VECTOR_TOP_K", d.vector_top_k),
            vector_candidate_threshold: env_or(
                "RESOLUTION_VECTOR_CANDIDATE_THRESHOLD",
                d.vector_candidate_threshold,
            ),
            vector_auto_accept_threshold: env_or(
                "RESOLUTION_VECTOR_AUTO_ACCEPT_THRESHOLD",
                d.vector_auto_accept_threshold,
            ),
            heuristic_only: env::var("RESOLUTION_HEURISTIC_ONLY")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(d.heuristic_only),
            agentic_max_steps: env_or("RESOLUTION_AGENTIC_MAX_STEPS", d.agentic_max_steps),
            llm_timeout_ms: env_or("RESOLUTION_LLM_TIMEOUT_MS", d.llm_timeout_ms),
        }
    }
}

impl RevisionConfig {
    /// Load revision tuning, defaulting each missing value.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_similarity: env_or("REVISION_MIN_SIMILARITY", d.min_similarity),
            top_k: env_or("REVISION_TOP_K", d.top_k),
            auto_merge_threshold: env_or("REVISION_AUTO_MERGE_THRESHOLD", d.auto_merge_threshold),
            llm_timeout_ms: env_or("REVISION_LLM_TIMEOUT_MS", d.llm_timeout_ms),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            extraction: "dice-extraction-v1".to_string(),
            verification: "dice-entity-verification-v1".to_string(),
            bakeoff: "dice-entity-bakeoff-v1".to_string(),
            agentic_search: "dice-agentic-search-v1".to_string(),
            classification: "dice-proposition-classifier-v1".to_string(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            fuzzy_max_distance_ratio: 0.2,
            fuzzy_min_length: 4,
            text_top_k: 10,
            text_threshold: 0.0,
            vector_top_k: 10,
            vector_candidate_threshold: 0.7,
            vector_auto_accept_threshold: 0.95,
            heuristic_only: false,
            agentic_max_steps: 3,
            llm_timeout_ms: 30000,
        }
    }
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            top_k: 5,
            auto_merge_threshold: 0.95,
            llm_timeout_ms: 30000,
        }
    }
}
