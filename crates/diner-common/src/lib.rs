//! Diner Common - Shared types and utilities
//!
//! This crate provides the restaurant data model, query shapes, error
//! definitions and process configuration used across all Diner components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheBackend, Config, ConfigSnapshot};
pub use error::{Error, Result};
pub use types::*;
