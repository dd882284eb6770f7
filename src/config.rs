//! Configuration loading and constants.
//!
//! Loads application configuration from a TOML file and defines constants for
//! retrieval tuning, generation limits, health probe budgets, logging format,
//! and default paths. `AppConfig` is the root configuration struct containing
//! all settings.

use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// Health Probe Budget
// =============================================================================
// The container orchestrator probes GET /health every 30 seconds with a
// 3-second timeout and a 20-second start grace period. Those numbers live in
// the deployment artifact; the one the process must respect is the per-probe
// timeout: any internal readiness check has to finish comfortably inside it.

/// Upper bound for the deep readiness check, strictly below the
/// orchestrator's 3-second probe timeout.
pub const READY_CHECK_TIMEOUT_SECS: u64 = 2;

// =============================================================================
// Retrieval Constants
// =============================================================================

/// Candidate pool multiplier: search `top_k * CANDIDATE_MULTIPLIER` before
/// MMR re-ranking narrows the set back down.
pub const CANDIDATE_MULTIPLIER: usize = 5;

/// Minimum candidate pool size regardless of `top_k`.
pub const MIN_CANDIDATE_POOL: usize = 20;

// =============================================================================
// Answer Constants
// =============================================================================

/// Maximum characters of context quoted in the dev-mode answer (no API key).
pub const DEV_PREVIEW_LIMIT: usize = 700;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "riskqa=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// OpenAI API settings
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// On-disk vector index location
    #[serde(default)]
    pub index: IndexConfig,
    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
}

impl HttpServerConfig {
    fn default_host() -> String {
        // Bound to all interfaces: the container runtime maps the port.
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8000
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// OpenAI API settings for embeddings and grounded generation
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// API key; overridden by the OPENAI_API_KEY environment variable.
    /// When absent the service still answers, in dev mode.
    pub api_key: Option<String>,
    /// API base URL override (proxies, test doubles); overridden by
    /// the OPENAI_BASE_URL environment variable.
    pub api_base: Option<String>,
    /// Chat model used for grounded answers
    #[serde(default = "OpenAiConfig::default_chat_model")]
    pub chat_model: String,
    /// Embedding model used for query vectors
    #[serde(default = "OpenAiConfig::default_embedding_model")]
    pub embedding_model: String,
    /// Sampling temperature for answers
    #[serde(default = "OpenAiConfig::default_temperature")]
    pub temperature: f32,
    /// Completion token cap per answer
    #[serde(default = "OpenAiConfig::default_max_tokens")]
    pub max_tokens: u32,
}

impl OpenAiConfig {
    fn default_chat_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_embedding_model() -> String {
        "text-embedding-3-small".to_string()
    }

    fn default_temperature() -> f32 {
        0.2
    }

    fn default_max_tokens() -> u32 {
        350
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            chat_model: Self::default_chat_model(),
            embedding_model: Self::default_embedding_model(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
        }
    }
}

/// On-disk index layout: a chunk metadata JSONL file and a row-aligned
/// vectors JSONL file, both produced by the offline index build.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "IndexConfig::default_dir")]
    pub dir: String,
    #[serde(default = "IndexConfig::default_meta_file")]
    pub meta_file: String,
    #[serde(default = "IndexConfig::default_vectors_file")]
    pub vectors_file: String,
}

impl IndexConfig {
    fn default_dir() -> String {
        "data/processed".to_string()
    }

    fn default_meta_file() -> String {
        "meta.jsonl".to_string()
    }

    fn default_vectors_file() -> String {
        "vectors.jsonl".to_string()
    }

    /// Full path to the chunk metadata file
    pub fn meta_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.meta_file)
    }

    /// Full path to the vectors file
    pub fn vectors_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.vectors_file)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            meta_file: Self::default_meta_file(),
            vectors_file: Self::default_vectors_file(),
        }
    }
}

/// Retrieval tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the generator
    #[serde(default = "RetrievalConfig::default_top_k")]
    pub top_k: usize,
    /// Similarity floor below which the service refuses to speculate
    #[serde(default = "RetrievalConfig::default_low_confidence")]
    pub low_confidence: f32,
    /// MMR trade-off between relevance (1.0) and diversity (0.0)
    #[serde(default = "RetrievalConfig::default_mmr_lambda")]
    pub mmr_lambda: f32,
    /// Maximum citations returned per answer, after deduplication
    #[serde(default = "RetrievalConfig::default_max_citations")]
    pub max_citations: usize,
}

impl RetrievalConfig {
    fn default_top_k() -> usize {
        5
    }

    fn default_low_confidence() -> f32 {
        0.35
    }

    fn default_mmr_lambda() -> f32 {
        0.7
    }

    fn default_max_citations() -> usize {
        5
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: Self::default_top_k(),
            low_confidence: Self::default_low_confidence(),
            mmr_lambda: Self::default_mmr_lambda(),
            max_citations: Self::default_max_citations(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: container deployments configure the
    /// service entirely through defaults and environment variables. After
    /// parsing, `OPENAI_API_KEY` and `OPENAI_BASE_URL` override the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<AppConfig>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.openai.api_key = Some(key);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            if !base.is_empty() {
                config.openai.api_base = Some(base);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation(
                "http.port must be non-zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Validation(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(ConfigError::Validation(
                "retrieval.mmr_lambda must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(ConfigError::Validation(
                "openai.temperature must be within [0, 2]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
