//! Error types for velociraptor.
//!
//! Missing pages, unknown identifiers, degenerate vectors and collaborator
//! failures are not errors: they surface as empty results. Only structural
//! violations, I/O and configuration problems are reported here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, VelociraptorError>;

/// Errors that can occur while building, storing or serving document trees.
#[derive(Error, Debug)]
pub enum VelociraptorError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document path does not exist.
    #[error("Document not found at '{0}'")]
    DocumentNotFound(PathBuf),

    /// The persisted tree file does not exist.
    #[error("Index file not found at '{0}'")]
    IndexNotFound(PathBuf),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM or embedding API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A node references a parent or child that is not part of its tree,
    /// or the parent/child links disagree.
    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    /// A store mutation referenced something the store does not hold.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store internals failed (e.g. a poisoned lock).
    #[error("Store error: {0}")]
    Store(String),
}

impl VelociraptorError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a structural violation error.
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::StructuralViolation(msg.into())
    }
}

impl From<reqwest::Error> for VelociraptorError {
    fn from(err: reqwest::Error) -> Self {
        VelociraptorError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for VelociraptorError {
    fn from(err: serde_json::Error) -> Self {
        VelociraptorError::LlmParse(err.to_string())
    }
}
