//! Backing store interface.
//!
//! The coordinator treats the store as authoritative. Every method is a
//! single round trip; nothing here retries.

use async_trait::async_trait;
use diner_common::{Error, RankedQuery, Restaurant};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("restaurant already exists: {0}")]
    AlreadyExists(String),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(name) => Self::AlreadyExists { name },
            other => Self::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable restaurant storage with ranked secondary-index queries.
#[async_trait]
pub trait RestaurantStore: Send + Sync {
    /// Insert a new restaurant.
    ///
    /// The existence check and the insert are one atomic step; a concurrent
    /// insert of the same name sees `StoreError::AlreadyExists`.
    async fn insert(&self, restaurant: &Restaurant) -> StoreResult<()>;

    /// Point lookup by name
    async fn get(&self, name: &str) -> StoreResult<Option<Restaurant>>;

    /// Delete by name if present, returning the removed record
    async fn delete(&self, name: &str) -> StoreResult<Option<Restaurant>>;

    /// Fold `rating` into the running average as one atomic
    /// read-modify-write. Returns the updated record, or `None` if the
    /// restaurant does not exist.
    async fn add_rating(&self, name: &str, rating: f64) -> StoreResult<Option<Restaurant>>;

    /// Rating-descending rows of `query.shape`, at most `query.limit`,
    /// keeping only rows above the shape's threshold if it has one.
    async fn query(&self, query: &RankedQuery) -> StoreResult<Vec<Restaurant>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: Error = StoreError::AlreadyExists("A".into()).into();
        assert!(matches!(err, Error::AlreadyExists { ref name } if name == "A"));
        assert_eq!(err.http_status_code(), 409);

        let io = std::io::Error::other("disk gone");
        let err: Error = StoreError::from(io).into();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(err.http_status_code(), 500);
    }
}
