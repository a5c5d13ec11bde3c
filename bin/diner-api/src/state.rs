//! Shared handler state

use diner_cache::MemoryCache;
use diner_common::Config;
use diner_core::Coordinator;
use std::sync::Arc;

/// State shared by every handler
pub struct AppState {
    pub coordinator: Coordinator,
    pub config: Config,
    /// Set when the in-process cache backs the coordinator
    pub memory_cache: Option<Arc<MemoryCache>>,
}

impl AppState {
    pub const fn new(coordinator: Coordinator, config: Config) -> Self {
        Self {
            coordinator,
            config,
            memory_cache: None,
        }
    }

    /// Expose the in-process cache's own counters on `/metrics`
    #[must_use]
    pub fn with_memory_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.memory_cache = Some(cache);
        self
    }
}
