//! DocForge Common Library
//!
//! Shared code for the DocForge retrieval core including:
//! - Error types and handling
//! - Configuration management
//! - Embedding provider abstraction
//! - Database pool and passage entities
//! - Metrics and observability
//! - Retry with backoff for model endpoints

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod retry;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use embeddings::EmbeddingProvider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
