//! Diner Core - Cache-aside coordination
//!
//! The [`Coordinator`] is the only component that talks to both the store
//! and the cache. It derives cache keys from query shapes, serves reads
//! from the cache when it can, and invalidates on every write it performs.

pub mod coordinator;
pub mod keys;
pub mod stats;
pub mod value;

pub use coordinator::Coordinator;
pub use keys::CacheKey;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use value::CacheValue;
