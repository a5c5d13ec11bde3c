//! Error types for Diner
//!
//! This module defines the common error type surfaced by the coordinator
//! and mapped onto HTTP responses by the API layer.

use thiserror::Error;

/// Common result type for Diner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Diner
#[derive(Debug, Error)]
pub enum Error {
    // Client-correctable errors
    #[error("restaurant already exists: {name}")]
    AlreadyExists { name: String },

    #[error("restaurant not found: {0}")]
    NotFound(String),

    #[error("no restaurants found: {0}")]
    NoResults(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Collaborator failures
    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    // Internal errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a not found error for a restaurant name
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an empty-result error for a ranked query
    pub fn no_results(what: impl Into<String>) -> Self {
        Self::NoResults(what.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoResults(_))
    }

    /// Get HTTP status code for the API layer
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidArgument(_) => 400,

            // 404 Not Found
            Self::NotFound(_) | Self::NoResults(_) => 404,

            // 409 Conflict
            Self::AlreadyExists { .. } => 409,

            // 500 Internal Server Error
            Self::Store(_) | Self::Cache(_) | Self::Serialization(_) => 500,

            // 503 Service Unavailable
            Self::Configuration(_) => 503,
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::NotFound(_) => "NotFound",
            Self::NoResults(_) => "NoResults",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Store(_) => "StoreFailure",
            Self::Cache(_) => "CacheFailure",
            Self::Serialization(_) | Self::Configuration(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("a").is_not_found());
        assert!(Error::no_results("cuisine Thai").is_not_found());
        assert!(!Error::store("boom").is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::AlreadyExists { name: "a".into() }.http_status_code(), 409);
        assert_eq!(Error::not_found("a").http_status_code(), 404);
        assert_eq!(Error::invalid_argument("x").http_status_code(), 400);
        assert_eq!(Error::store("x").http_status_code(), 500);
        assert_eq!(Error::cache("x").http_status_code(), 500);
    }

    #[test]
    fn test_error_code() {
        assert_eq!(Error::store("x").error_code(), "StoreFailure");
        assert_eq!(Error::cache("x").error_code(), "CacheFailure");
    }
}
