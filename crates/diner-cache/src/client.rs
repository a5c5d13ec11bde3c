//! Cache client interface

use async_trait::async_trait;
use bytes::Bytes;
use diner_common::Error;

/// Error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache request timed out")]
    Timeout,

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("cache protocol error: {0}")]
    Protocol(String),

    #[error("cache server error: {0}")]
    Server(String),

    #[error("value not stored for key {0}")]
    NotStored(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl From<CacheError> for Error {
    fn from(e: CacheError) -> Self {
        Self::Cache(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value access to a memory cache with explicit invalidation.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Short name for logs and metrics
    fn name(&self) -> &str;

    /// Read a value, `None` on miss
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Store a value with no expiry
    async fn set(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Remove a value; removing a missing key succeeds
    async fn delete(&self, key: &str) -> CacheResult<()>;
}
