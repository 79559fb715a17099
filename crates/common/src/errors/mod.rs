//! Error types for the DocForge retrieval core
//!
//! Provides:
//! - Distinct error types for each failure mode of the retrieval chain
//! - Machine-readable error codes
//! - Client/server classification and retry hints

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidParameter,

    // Retrieval backend errors (7xxx)
    RetrievalUnavailable,
    DatabaseError,

    // External service errors (8xxx)
    ScoringFailure,
    EmbeddingError,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidParameter => 1001,

            ErrorCode::RetrievalUnavailable => 7001,
            ErrorCode::DatabaseError => 7002,

            ErrorCode::ScoringFailure => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::UpstreamError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// A numeric or structural parameter is out of range
    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    /// The vector or lexical store could not be reached
    #[error("Retrieval backend `{backend}` unavailable: {message}")]
    RetrievalUnavailable { backend: String, message: String },

    /// The cross-encoder call errored or returned a malformed batch
    #[error("Relevance scoring failed: {message}")]
    ScoringFailure { message: String, retryable: bool },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String, retryable: bool },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a `RetrievalUnavailable` error
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::RetrievalUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// A scoring failure that will recur on retry (malformed batch, 4xx)
    pub fn scoring(message: impl Into<String>) -> Self {
        AppError::ScoringFailure {
            message: message.into(),
            retryable: false,
        }
    }

    /// A scoring failure caused by the transport or an overloaded service
    pub fn scoring_transient(message: impl Into<String>) -> Self {
        AppError::ScoringFailure {
            message: message.into(),
            retryable: true,
        }
    }

    /// An embedding failure that will recur on retry
    pub fn embedding(message: impl Into<String>) -> Self {
        AppError::EmbeddingError {
            message: message.into(),
            retryable: false,
        }
    }

    /// An embedding failure caused by the transport or an overloaded service
    pub fn embedding_transient(message: impl Into<String>) -> Self {
        AppError::EmbeddingError {
            message: message.into(),
            retryable: true,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            AppError::RetrievalUnavailable { .. } => ErrorCode::RetrievalUnavailable,
            AppError::ScoringFailure { .. } => ErrorCode::ScoringFailure,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Errors caused by the caller's input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::InvalidParameter { .. })
    }

    /// Errors a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RetrievalUnavailable { .. }
            | AppError::Database(_)
            | AppError::HttpClient(_) => true,
            AppError::EmbeddingError { retryable, .. }
            | AppError::ScoringFailure { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort();
        let name = fields
            .into_iter()
            .next()
            .unwrap_or_else(|| "request".to_string());

        AppError::InvalidParameter {
            name,
            message: errors.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}
