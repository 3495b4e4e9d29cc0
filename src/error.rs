use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::retrieval::SearchError;

/// Main error type for maester
#[derive(Error, Debug)]
pub enum MaesterError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Artifact bundle missing or malformed
    #[error("Artifact error: {path}: {message}")]
    Artifact { path: PathBuf, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Retrieval failed
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Embedding provider errors outside of a search
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MaesterError {
    pub fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for maester operations
pub type Result<T> = std::result::Result<T, MaesterError>;
