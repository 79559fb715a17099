//! Configuration management for DocForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cross-encoder configuration
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hash
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    /// Cross-encoder scoring endpoint; term overlap scoring is used when unset
    pub endpoint: Option<String>,

    /// Model identifier sent to the scoring endpoint
    #[serde(default = "default_reranker_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_reranker_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Retrieval tuning shared by hybrid search, reranking and MMR
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalConfig {
    /// Candidate pool size requested from the vector store
    #[validate(range(min = 1))]
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Candidate pool size requested from the lexical index
    #[validate(range(min = 1))]
    #[serde(default = "default_lexical_top_k")]
    pub lexical_top_k: usize,

    /// Fused candidates handed to the reranker
    #[validate(range(min = 1))]
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Passages returned after reranking and diversification
    #[validate(range(min = 1))]
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Weight of the vector score during fusion (lexical gets the remainder)
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// MMR trade-off: 1.0 is pure relevance, 0.0 pure diversity
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,

    /// Weight of the cross-encoder score in the combined score
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_rerank_weight")]
    pub rerank_weight: f32,

    /// Fuse the surviving retriever's results when the other one fails
    #[serde(default)]
    pub degrade_on_partial_failure: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_reranker_model() -> String { "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string() }
fn default_reranker_timeout() -> u64 { 15 }
fn default_vector_top_k() -> usize { 50 }
fn default_lexical_top_k() -> usize { 50 }
fn default_max_results() -> usize { 30 }
fn default_rerank_top_k() -> usize { 8 }
fn default_vector_weight() -> f32 { 0.7 }
fn default_mmr_lambda() -> f32 { 0.7 }
fn default_rerank_weight() -> f32 { 1.0 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "docforge-search".to_string() }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_reranker_model(),
            timeout_secs: default_reranker_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: default_vector_top_k(),
            lexical_top_k: default_lexical_top_k(),
            max_results: default_max_results(),
            rerank_top_k: default_rerank_top_k(),
            vector_weight: default_vector_weight(),
            mmr_lambda: default_mmr_lambda(),
            rerank_weight: default_rerank_weight(),
            degrade_on_partial_failure: false,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__VECTOR_WEIGHT=0.6
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Validate retrieval tuning; called once at startup
    pub fn validate(&self) -> crate::Result<()> {
        self.retrieval.validate()?;
        // Range validation lets NaN through
        for (name, value) in [
            ("retrieval.vector_weight", self.retrieval.vector_weight),
            ("retrieval.mmr_lambda", self.retrieval.mmr_lambda),
            ("retrieval.rerank_weight", self.retrieval.rerank_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::AppError::invalid(
                    name,
                    format!("must be within [0, 1], got {}", value),
                ));
            }
        }
        if self.embedding.dimension == 0 {
            return Err(crate::AppError::invalid(
                "embedding.dimension",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/docforge".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
