//! Configuration types for Diner
//!
//! The process reads its configuration once at startup (flags and
//! environment variables, see the `diner-api` binary) and hands an
//! immutable [`Config`] to every component that needs it.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Endpoint value selecting the in-process cache
pub const MEMORY_ENDPOINT: &str = "memory://";

/// Default memcached port when the endpoint omits one
pub const MEMCACHED_DEFAULT_PORT: u16 = 11211;

/// Root configuration for Diner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Memcached endpoint (`host:port`), `memory://`, or unset
    pub cache_endpoint: Option<String>,
    /// Store table identifier
    pub table_name: String,
    /// Deployment region reported by the configuration endpoint
    pub region: String,
    /// Global cache switch
    pub use_cache: bool,
    /// Address for the HTTP API
    pub listen: SocketAddr,
    /// Directory holding the store database file
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_endpoint: None,
            table_name: "Restaurants".to_string(),
            region: "us-east-1".to_string(),
            use_cache: false,
            listen: SocketAddr::from(([0, 0, 0, 0], 80)),
            data_dir: PathBuf::from("/var/lib/diner"),
        }
    }
}

/// Which cache client a configuration selects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process LRU map
    Memory,
    /// Memcached server at `host:port`
    Memcached(String),
}

impl Config {
    /// Check the configuration before any component is built
    ///
    /// # Errors
    /// Returns `Error::Configuration` for an empty table name or a
    /// memcached endpoint without a host.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(Error::Configuration("table name must not be empty".into()));
        }
        if let CacheBackend::Memcached(addr) = self.cache_backend() {
            if addr.starts_with(':') {
                return Err(Error::Configuration(format!(
                    "cache endpoint has no host: {addr}"
                )));
            }
        }
        Ok(())
    }

    /// Map the endpoint onto a cache client choice
    #[must_use]
    pub fn cache_backend(&self) -> CacheBackend {
        match self.cache_endpoint.as_deref().map(str::trim) {
            None | Some("" | MEMORY_ENDPOINT) => CacheBackend::Memory,
            Some(endpoint) => {
                let endpoint = endpoint.strip_prefix("memcached://").unwrap_or(endpoint);
                if endpoint.contains(':') {
                    CacheBackend::Memcached(endpoint.to_string())
                } else {
                    CacheBackend::Memcached(format!("{endpoint}:{MEMCACHED_DEFAULT_PORT}"))
                }
            }
        }
    }

    /// Path of the store database file
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("diner.redb")
    }

    /// The snapshot served by `GET /`
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            cache_endpoint: self.cache_endpoint.clone(),
            table_name: self.table_name.clone(),
            region: self.region.clone(),
            use_cache: self.use_cache,
        }
    }
}

/// Process configuration as reported to clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(
        rename = "MEMCACHED_CONFIGURATION_ENDPOINT",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_endpoint: Option<String>,
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "AWS_REGION")]
    pub region: String,
    #[serde(rename = "USE_CACHE")]
    pub use_cache: bool,
}
