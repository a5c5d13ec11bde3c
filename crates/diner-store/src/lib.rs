//! Diner Store - Backing store for the restaurant directory
//!
//! This crate defines the [`RestaurantStore`] interface the coordinator
//! talks to and a redb-backed implementation with one primary table and
//! three rating-ordered secondary indexes (cuisine, region, region-cuisine).

pub mod redb_store;
pub mod store;
pub mod tables;

// Re-exports
pub use redb_store::RedbRestaurantStore;
pub use store::{RestaurantStore, StoreError, StoreResult};
