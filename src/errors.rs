//! Typed error hierarchy for partsmith.
//!
//! Four top-level enums cover the subsystems:
//! - `ModelError`: failures reported by a model client
//! - `PipelineError`: fatal checks before a tutorial run starts
//! - `ConfigError`: configuration and stage catalog loading
//! - `StorageError`: image intake and tutorial export

use thiserror::Error;

/// Errors from a model client call.
///
/// Only `Unavailable` is worth retrying. `Malformed` is handled like
/// `Rejected` by the stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Model unavailable: {message}")]
    Unavailable { message: String },

    #[error("Model rejected the request: {message}")]
    Rejected { message: String },

    #[error("Malformed model response: {message}")]
    Malformed { message: String },
}

impl ModelError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Whether the stage executor may issue a fresh call after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors that abort a tutorial run before any model call is made.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Project name must not be empty")]
    EmptyProjectName,
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid stage catalog: {0}")]
    InvalidCatalog(String),

    #[error("GOOGLE_API_KEY is not set; add it to the environment or .env, or use the echo provider")]
    MissingApiKey,
}

/// Errors from storing uploads and writing exports.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Uploaded image is empty")]
    EmptyImage,

    #[error("Failed to write {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
