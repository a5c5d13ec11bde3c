//! Diner Cache - Cache clients
//!
//! This crate provides the [`CacheClient`] interface used by the
//! coordinator, a memcached client speaking the ASCII protocol, and an
//! in-process LRU cache for single-node deployments and tests.
//!
//! Entries never expire on their own; callers invalidate explicitly.

pub mod client;
pub mod memcache;
pub mod memory;
pub mod protocol;

// Re-exports
pub use client::{CacheClient, CacheError, CacheResult};
pub use memcache::{MemcacheClient, MemcacheConfig};
pub use memory::{CacheCapacity, MemoryCache, MemoryCacheStats};
