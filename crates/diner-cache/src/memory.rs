//! In-process LRU cache
//!
//! Serves single-node deployments and tests. Entries have no TTL; they leave
//! the cache only by explicit delete or by LRU eviction.

use crate::client::{CacheClient, CacheError, CacheResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct CacheEntry {
    data: Bytes,
    /// Logical clock value of the last access
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(data: Bytes, clock: u64) -> Self {
        Self {
            data,
            last_access: AtomicU64::new(clock),
        }
    }

    fn touch(&self, clock: u64) {
        self.last_access.store(clock, Ordering::Relaxed);
    }

    fn size(key: &str, data: &[u8]) -> usize {
        key.len() + data.len()
    }
}

/// Cache capacity, by entry count or by key+value bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCapacity {
    Entries(usize),
    Bytes(usize),
}

impl Default for CacheCapacity {
    fn default() -> Self {
        Self::Entries(10_000)
    }
}

/// Counters for the in-process cache
#[derive(Debug, Default)]
pub struct MemoryCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    /// Operations failed on purpose via [`MemoryCache::fail_next`]
    pub injected_failures: AtomicU64,
}

impl MemoryCacheStats {
    /// Hit ratio in `[0.0, 1.0]`
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    bytes: usize,
}

/// LRU map implementing [`CacheClient`]
pub struct MemoryCache {
    entries: RwLock<Entries>,
    capacity: CacheCapacity,
    clock: AtomicU64,
    stats: MemoryCacheStats,
    fail_budget: AtomicU64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(CacheCapacity::default())
    }
}

impl MemoryCache {
    pub fn new(capacity: CacheCapacity) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity,
            clock: AtomicU64::new(0),
            stats: MemoryCacheStats::default(),
            fail_budget: AtomicU64::new(0),
        }
    }

    pub const fn stats(&self) -> &MemoryCacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().map.contains_key(key)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.bytes = 0;
    }

    /// Make the next `n` operations fail with [`CacheError::Unavailable`]
    pub fn fail_next(&self, n: u64) {
        self.fail_budget.store(n, Ordering::Relaxed);
    }

    fn injected_failure(&self) -> CacheResult<()> {
        let took = self
            .fail_budget
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if took {
            self.stats.injected_failures.fetch_add(1, Ordering::Relaxed);
            Err(CacheError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn over_capacity(&self, entries: &Entries, incoming: usize) -> bool {
        if entries.map.is_empty() {
            return false;
        }
        match self.capacity {
            CacheCapacity::Entries(n) => entries.map.len() >= n,
            CacheCapacity::Bytes(n) => entries.bytes + incoming > n,
        }
    }

    fn find_lru_entry(entries: &Entries) -> Option<String> {
        entries
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone())
    }

    fn remove_entry(entries: &mut Entries, key: &str) -> Option<CacheEntry> {
        let entry = entries.map.remove(key)?;
        entries.bytes -= CacheEntry::size(key, &entry.data);
        Some(entry)
    }

    /// Synchronous lookup, counted in the stats
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        let entries = self.entries.read();
        if let Some(entry) = entries.map.get(key) {
            entry.touch(self.tick());
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.data.clone())
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Synchronous insert, evicting least recently used entries to fit
    pub fn insert(&self, key: &str, data: Bytes) {
        let clock = self.tick();
        let size = CacheEntry::size(key, &data);
        let mut entries = self.entries.write();

        // Replacing frees the old entry's share first
        Self::remove_entry(&mut entries, key);

        while self.over_capacity(&entries, size) {
            let Some(evict_key) = Self::find_lru_entry(&entries) else {
                break;
            };
            Self::remove_entry(&mut entries, &evict_key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }

        entries.bytes += size;
        entries.map.insert(key.to_string(), CacheEntry::new(data, clock));
    }

    /// Synchronous removal
    pub fn invalidate(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.write();
        Self::remove_entry(&mut entries, key).map(|e| e.data)
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.injected_failure()?;
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.injected_failure()?;
        self.insert(key, Bytes::copy_from_slice(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.injected_failure()?;
        self.invalidate(key);
        Ok(())
    }
}
