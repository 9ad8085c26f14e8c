// src/error.rs

//! Error types for the Canvas client library

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the template model, the remote service and the
/// package backend
#[derive(Debug, Error)]
pub enum Error {
    /// Remote call failed (network, HTTP status or server-reported error)
    #[error("error: {0}")]
    Service(String),

    /// Remote lookup returned no match
    #[error("error: {0}")]
    NotFound(String),

    /// Login against the service was rejected
    #[error("error: {0}")]
    Authentication(String),

    /// An API received the wrong aggregate kind
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A tolerantly parsed value lacks a field required by the caller
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A `user:name` reference could not be understood
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A repository failed to load while analysing the system
    #[error("repository '{stub}' failed to load: {reason}")]
    Repo { stub: String, reason: String },

    /// The package manager could not resolve the requested changes
    #[error("dependency resolution failed: {0}")]
    Solver(String),

    /// Downloading or executing a transaction failed
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The host package manager could not be queried
    #[error("package manager error: {0}")]
    Backend(String),

    /// Local configuration could not be read or written
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation is not offered by the service or backend
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a service error carrying a lower-cased reason
    pub fn service(reason: impl AsRef<str>) -> Self {
        Error::Service(reason.as_ref().to_lowercase())
    }

    /// True for errors raised by the remote service; these are caught at the
    /// command boundary and turned into a non-zero exit code
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            Error::Service(_) | Error::NotFound(_) | Error::Authentication(_)
        )
    }
}
