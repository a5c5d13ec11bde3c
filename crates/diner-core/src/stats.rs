//! Cache statistics kept by the coordinator

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the coordinator's use of the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads answered by the cache
    pub hits: AtomicU64,
    /// Reads that fell through to the store
    pub misses: AtomicU64,
    /// Entries written after a store read or write
    pub populates: AtomicU64,
    /// Entries deleted or generations replaced
    pub invalidations: AtomicU64,
    /// Cache failures that were logged and swallowed
    pub errors: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub populates: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub hit_ratio: f64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populates: self.populates.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
        }
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn populate(&self) {
        self.populates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}
