//! Error types for the semantic index
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::embedding::ProviderError;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Embedding provider errors that could not be retried away
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Vector index errors (dimension mismatch, invalid scores)
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Project lookup errors
    #[error("No indexer registered for project '{name}'. Run an index pass first.")]
    ProjectNotFound { name: String },

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Process exit code for the CLI, sysexits-flavored.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileRead { .. } | Self::FileWrite { .. } => 74, // EX_IOERR
            // Half precision is rejected during configuration validation
            Self::ConfigError { .. } | Self::Vector(VectorError::HalfPrecisionUnsupported) => 78, // EX_CONFIG
            Self::Provider(_) => 69,            // EX_UNAVAILABLE
            Self::ProjectNotFound { .. } => 66, // EX_NOINPUT
            Self::Vector(_) | Self::General(_) => 1,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::ConfigError { .. } => vec![
                "Review .semdex/config.toml against the documented schema",
                "Unset SEMDEX_* environment variables that may override the file",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "Ensure the query and the index were embedded with the same model",
                "Run 'semdex index --force' after changing the embedding model",
            ],
            Self::Vector(VectorError::HalfPrecisionUnsupported) => vec![
                "Set embedding.precision = \"full\" in .semdex/config.toml",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, IndexError>;

    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| {
            IndexError::General(format!("Error processing '{}': {}", path.display(), e))
        })
    }
}
