//! Cache-aside coordinator
//!
//! Reads consult the cache first and fall back to the store, populating the
//! cache on the way out. Writes go to the store first; only after the store
//! accepts them are cache entries written or invalidated.
//!
//! Ranked query results are cached under keys that embed a generation token
//! per index label (see [`keys::generation_key`]). A write replaces the tokens
//! for the cuisine, region and region-cuisine of the restaurant it touched,
//! which orphans every cached result for those labels regardless of limit or
//! threshold.
//!
//! Cache failures never fail a request. They are logged, counted in
//! [`CacheStats`], and the request continues against the store.

use crate::keys::{self, CacheKey};
use crate::stats::CacheStats;
use crate::value::CacheValue;
use diner_cache::CacheClient;
use diner_common::{
    validate_rating, Config, Error, IndexKind, QueryLimit, QueryShape, RankedQuery,
    RatingThreshold, Restaurant, Result,
};
use diner_store::{RestaurantStore, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Sequences store and cache access for every restaurant operation
pub struct Coordinator {
    store: Arc<dyn RestaurantStore>,
    cache: Option<Arc<dyn CacheClient>>,
    stats: CacheStats,
}

impl Coordinator {
    /// Create a coordinator. `cache: None` runs store-only.
    pub fn new(store: Arc<dyn RestaurantStore>, cache: Option<Arc<dyn CacheClient>>) -> Self {
        Self {
            store,
            cache,
            stats: CacheStats::default(),
        }
    }

    /// Create a coordinator honoring the configured cache switch
    pub fn from_config(
        config: &Config,
        store: Arc<dyn RestaurantStore>,
        cache: Option<Arc<dyn CacheClient>>,
    ) -> Self {
        let cache = cache.filter(|_| config.use_cache);
        match &cache {
            Some(c) => info!("Caching enabled ({})", c.name()),
            None => info!("Caching disabled"),
        }
        Self::new(store, cache)
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn cache(&self) -> Option<&dyn CacheClient> {
        self.cache.as_deref()
    }

    // ---- operations ----

    /// Insert a new, unrated restaurant
    ///
    /// # Errors
    /// `Error::AlreadyExists` if the name is taken, `Error::Store` on any
    /// other store failure.
    pub async fn create(&self, name: &str, cuisine: &str, region: &str) -> Result<Restaurant> {
        let restaurant = Restaurant::new(name, cuisine, region);
        self.store
            .insert(&restaurant)
            .await
            .map_err(|e| store_error("insert", e))?;
        info!("Created restaurant {} ({}, {})", name, cuisine, region);

        if let Some(cache) = self.cache() {
            let value = CacheValue::Restaurant(restaurant.clone());
            self.populate(cache, &keys::restaurant_key(name), &value).await;
            self.bump_generations(cache, &restaurant).await;
        }
        Ok(restaurant)
    }

    /// Read one restaurant, cache first
    ///
    /// # Errors
    /// `Error::NotFound` if no such restaurant exists, `Error::Store` if the
    /// store read fails.
    pub async fn get_by_name(&self, name: &str) -> Result<Restaurant> {
        let key = keys::restaurant_key(name);
        if let Some(cache) = self.cache() {
            if let Some(restaurant) = self.lookup(cache, &key, CacheValue::into_restaurant).await {
                return Ok(restaurant);
            }
        }

        let restaurant = self
            .store
            .get(name)
            .await
            .map_err(|e| store_error("get", e))?
            .ok_or_else(|| Error::not_found(name))?;

        if let Some(cache) = self.cache() {
            self.populate(cache, &key, &CacheValue::Restaurant(restaurant.clone()))
                .await;
        }
        Ok(restaurant)
    }

    /// Delete a restaurant. Deleting a missing name succeeds.
    ///
    /// # Errors
    /// `Error::Store` if the store delete fails.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let removed = self
            .store
            .delete(name)
            .await
            .map_err(|e| store_error("delete", e))?;

        if let Some(cache) = self.cache() {
            self.invalidate(cache, &keys::restaurant_key(name)).await;
            if let Some(restaurant) = &removed {
                self.bump_generations(cache, restaurant).await;
            }
        }
        if removed.is_some() {
            info!("Deleted restaurant {}", name);
        }
        Ok(())
    }

    /// Fold a rating into a restaurant's running average
    ///
    /// # Errors
    /// `Error::InvalidArgument` for a rating outside `[0, 5]`,
    /// `Error::NotFound` if the restaurant does not exist, `Error::Store` if
    /// the update fails.
    pub async fn rate(&self, name: &str, rating: f64) -> Result<Restaurant> {
        let rating = validate_rating(rating)?;
        let updated = self
            .store
            .add_rating(name, rating)
            .await
            .map_err(|e| store_error("add_rating", e))?
            .ok_or_else(|| Error::not_found(name))?;
        debug!(
            "Rated {} with {}: now {} over {} ratings",
            name, rating, updated.rating, updated.rating_count
        );

        if let Some(cache) = self.cache() {
            self.invalidate(cache, &keys::restaurant_key(name)).await;
            self.bump_generations(cache, &updated).await;
        }
        Ok(updated)
    }

    /// Top restaurants of a cuisine, optionally above a rating
    ///
    /// # Errors
    /// `Error::NoResults` when nothing matches, `Error::Store` on failure.
    pub async fn query_by_cuisine(
        &self,
        cuisine: &str,
        threshold: Option<RatingThreshold>,
        limit: QueryLimit,
    ) -> Result<Vec<Restaurant>> {
        self.ranked(RankedQuery::by_cuisine(cuisine, threshold, limit))
            .await
    }

    /// Top restaurants of a region
    ///
    /// # Errors
    /// `Error::NoResults` when nothing matches, `Error::Store` on failure.
    pub async fn query_by_region(&self, region: &str, limit: QueryLimit) -> Result<Vec<Restaurant>> {
        self.ranked(RankedQuery::by_region(region, limit)).await
    }

    /// Top restaurants of a cuisine within a region
    ///
    /// # Errors
    /// `Error::NoResults` when nothing matches, `Error::Store` on failure.
    pub async fn query_by_region_and_cuisine(
        &self,
        region: &str,
        cuisine: &str,
        limit: QueryLimit,
    ) -> Result<Vec<Restaurant>> {
        self.ranked(RankedQuery::by_region_and_cuisine(region, cuisine, limit))
            .await
    }

    async fn ranked(&self, query: RankedQuery) -> Result<Vec<Restaurant>> {
        // No generation token means no safe key; run uncached
        let cached = match self.cache() {
            Some(cache) => self
                .generation(cache, query.shape.index(), &query.shape.label())
                .await
                .map(|generation| (cache, keys::query_key(&query, &generation))),
            None => None,
        };

        if let Some((cache, key)) = &cached {
            if let Some(rows) = self.lookup(*cache, key, CacheValue::into_list).await {
                return Ok(rows);
            }
        }

        let rows = self
            .store
            .query(&query)
            .await
            .map_err(|e| store_error("query", e))?;
        if rows.is_empty() {
            return Err(Error::no_results(describe(&query.shape)));
        }

        if let Some((cache, key)) = &cached {
            self.populate(*cache, key, &CacheValue::RestaurantList(rows.clone()))
                .await;
        }
        Ok(rows)
    }

    // ---- cache plumbing ----

    /// Read and decode `key`. Misses, undecodable entries, entries of the
    /// wrong kind and cache failures all come back as `None`.
    async fn lookup<T>(
        &self,
        cache: &dyn CacheClient,
        key: &CacheKey,
        extract: fn(CacheValue) -> std::result::Result<T, CacheValue>,
    ) -> Option<T> {
        let bytes = match cache.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("Cache miss: {}", key);
                self.stats.miss();
                return None;
            }
            Err(e) => {
                warn!("Cache read of {} failed: {}", key, e);
                self.stats.error();
                self.stats.miss();
                return None;
            }
        };

        let found = match CacheValue::decode(&bytes) {
            Ok(value) => extract(value).map_err(|other| {
                format!("expected a different kind, found {}", other.kind())
            }),
            Err(e) => Err(e.to_string()),
        };
        match found {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                self.stats.hit();
                Some(value)
            }
            Err(reason) => {
                warn!("Ignoring cache entry {}: {}", key, reason);
                self.stats.miss();
                None
            }
        }
    }

    async fn populate(&self, cache: &dyn CacheClient, key: &CacheKey, value: &CacheValue) {
        let bytes = match value.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Not caching {}: {}", key, e);
                self.stats.error();
                return;
            }
        };
        match cache.set(key.as_str(), &bytes).await {
            Ok(()) => self.stats.populate(),
            Err(e) => {
                warn!("Cache write of {} failed: {}", key, e);
                self.stats.error();
            }
        }
    }

    async fn invalidate(&self, cache: &dyn CacheClient, key: &CacheKey) {
        match cache.delete(key.as_str()).await {
            Ok(()) => self.stats.invalidation(),
            Err(e) => {
                warn!("Cache delete of {} failed, entry may be stale: {}", key, e);
                self.stats.error();
            }
        }
    }

    /// Current generation token for one index label, minting one if absent
    async fn generation(&self, cache: &dyn CacheClient, kind: IndexKind, label: &str) -> Option<String> {
        let key = keys::generation_key(kind, label);
        match cache.get(key.as_str()).await {
            Ok(Some(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(generation) => return Some(generation.to_string()),
                Err(_) => warn!("Replacing unreadable generation token {}", key),
            },
            Ok(None) => {}
            Err(e) => {
                warn!("Cache read of {} failed: {}", key, e);
                self.stats.error();
                return None;
            }
        }

        let fresh = Uuid::new_v4().simple().to_string();
        match cache.set(key.as_str(), fresh.as_bytes()).await {
            Ok(()) => Some(fresh),
            Err(e) => {
                warn!("Cache write of {} failed: {}", key, e);
                self.stats.error();
                None
            }
        }
    }

    /// Orphan every cached ranked result that could contain `restaurant`
    async fn bump_generations(&self, cache: &dyn CacheClient, restaurant: &Restaurant) {
        for kind in IndexKind::ALL {
            let key = keys::generation_key(kind, &kind.label_of(restaurant));
            let fresh = Uuid::new_v4().simple().to_string();
            match cache.set(key.as_str(), fresh.as_bytes()).await {
                Ok(()) => self.stats.invalidation(),
                Err(e) => {
                    warn!("Cache write of {} failed, ranked results may be stale: {}", key, e);
                    self.stats.error();
                }
            }
        }
    }
}

fn store_error(op: &str, e: StoreError) -> Error {
    if !matches!(e, StoreError::AlreadyExists(_)) {
        error!("Store {} failed: {}", op, e);
    }
    e.into()
}

fn describe(shape: &QueryShape) -> String {
    match shape {
        QueryShape::Cuisine {
            cuisine,
            threshold: Some(t),
        } => format!("cuisine {cuisine} rated above {t}"),
        QueryShape::Cuisine { cuisine, .. } => format!("cuisine {cuisine}"),
        QueryShape::Region { region } => format!("region {region}"),
        QueryShape::RegionCuisine { region, cuisine } => {
            format!("cuisine {cuisine} in region {region}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diner_cache::MemoryCache;
    use diner_store::RedbRestaurantStore;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<RedbRestaurantStore>,
        cache: Arc<MemoryCache>,
        coordinator: Coordinator,
    }

    fn harness(with_cache: bool) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbRestaurantStore::open(dir.path().join("test.redb"), "Restaurants").unwrap());
        let cache = Arc::new(MemoryCache::default());
        let cache_client: Option<Arc<dyn CacheClient>> = if with_cache {
            Some(cache.clone())
        } else {
            None
        };
        let coordinator = Coordinator::new(store.clone(), cache_client);
        Harness {
            _dir: dir,
            store,
            cache,
            coordinator,
        }
    }

    async fn scenario(coordinator: &Coordinator) {
        coordinator.create("RestaurantA", "Italian", "North").await.unwrap();
        coordinator.rate("RestaurantA", 5.0).await.unwrap();
        coordinator.rate("RestaurantA", 4.0).await.unwrap();

        let r = coordinator.get_by_name("RestaurantA").await.unwrap();
        assert!((r.rating - 4.5).abs() < 1e-9);
        assert_eq!(r.rating_count, 2);

        let by_cuisine = coordinator
            .query_by_cuisine("Italian", None, QueryLimit::DEFAULT)
            .await
            .unwrap();
        assert!(by_cuisine.iter().any(|r| r.name == "RestaurantA" && (r.rating - 4.5).abs() < 1e-9));

        let by_region = coordinator
            .query_by_region("North", QueryLimit::DEFAULT)
            .await
            .unwrap();
        assert!(by_region.iter().any(|r| r.name == "RestaurantA"));

        coordinator.delete("RestaurantA").await.unwrap();
        let err = coordinator.get_by_name("RestaurantA").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_scenario_with_cache() {
        let h = harness(true);
        // Warm the cache before every write to exercise invalidation
        h.coordinator.create("Other", "Italian", "North").await.unwrap();
        h.coordinator.query_by_cuisine("Italian", None, QueryLimit::DEFAULT).await.unwrap();
        h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        scenario(&h.coordinator).await;
        assert!(h.coordinator.stats().snapshot().populates > 0);
    }

    #[tokio::test]
    async fn test_scenario_without_cache() {
        let h = harness(false);
        scenario(&h.coordinator).await;
        assert!(h.cache.is_empty());
        assert_eq!(h.coordinator.stats().snapshot().populates, 0);
    }

    #[tokio::test]
    async fn test_create_twice() {
        let h = harness(true);
        let created = h.coordinator.create("A", "Pizza", "East").await.unwrap();
        assert_eq!(created.rating_count, 0);
        assert!(created.rating.abs() < f64::EPSILON);

        let err = h.coordinator.create("A", "Pizza", "East").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_create_populates_entity_entry() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "East").await.unwrap();
        assert!(h.cache.contains(keys::restaurant_key("A").as_str()));

        h.coordinator.get_by_name("A").await.unwrap();
        assert_eq!(h.coordinator.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_cached_read_survives_direct_store_write() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "East").await.unwrap();
        let first = h.coordinator.get_by_name("A").await.unwrap();

        // Bypass the coordinator; the cached entry is served unchanged
        h.store.add_rating("A", 5.0).await.unwrap();
        let second = h.coordinator.get_by_name("A").await.unwrap();
        assert_eq!(first, second);

        h.coordinator.delete("A").await.unwrap();
        assert!(h.coordinator.get_by_name("A").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rate_invalidates_entity_entry() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "East").await.unwrap();
        h.coordinator.get_by_name("A").await.unwrap();

        h.coordinator.rate("A", 3.0).await.unwrap();
        let r = h.coordinator.get_by_name("A").await.unwrap();
        assert!((r.rating - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rate_rejects_bad_values() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "East").await.unwrap();
        for bad in [-1.0, 5.5, f64::NAN] {
            let err = h.coordinator.rate("A", bad).await.unwrap_err();
            assert_eq!(err.http_status_code(), 400);
        }
        assert_eq!(h.coordinator.get_by_name("A").await.unwrap().rating_count, 0);
    }

    #[tokio::test]
    async fn test_rate_missing() {
        let h = harness(true);
        assert!(h.coordinator.rate("ghost", 3.0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_succeeds() {
        let h = harness(true);
        h.coordinator.delete("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_region_query_refreshed_after_create() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "North").await.unwrap();
        let before = h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        assert_eq!(before.len(), 1);

        // Served from cache
        h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        assert!(h.coordinator.stats().hits.load(Ordering::Relaxed) >= 1);

        h.coordinator.create("B", "Coffee", "North").await.unwrap();
        let after = h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        assert_eq!(after.len(), 2);
    }

    #[tokio::test]
    async fn test_cuisine_query_reordered_after_rating() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "North").await.unwrap();
        h.coordinator.create("B", "Pizza", "South").await.unwrap();
        h.coordinator.rate("A", 2.0).await.unwrap();
        h.coordinator.rate("B", 3.0).await.unwrap();

        let threshold = RatingThreshold::new(2.5);
        let rows = h.coordinator.query_by_cuisine("Pizza", threshold, QueryLimit::new(5)).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["B"]);

        h.coordinator.rate("A", 5.0).await.unwrap();
        let rows = h.coordinator.query_by_cuisine("Pizza", threshold, QueryLimit::new(5)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "A");
        assert!(rows.iter().all(|r| r.rating > 2.5));
    }

    #[tokio::test]
    async fn test_region_cuisine_query_after_delete() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "North").await.unwrap();
        h.coordinator.query_by_region_and_cuisine("North", "Pizza", QueryLimit::DEFAULT).await.unwrap();

        h.coordinator.delete("A").await.unwrap();
        let err = h
            .coordinator
            .query_by_region_and_cuisine("North", "Pizza", QueryLimit::DEFAULT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResults(_)));
    }

    #[tokio::test]
    async fn test_region_cuisine_matches_filtered_region() {
        let h = harness(true);
        let seeds = [
            ("Impostor", "Grill", "North_Korean", 5.0),
            ("Local", "Korean_Grill", "North", 4.0),
            ("Other", "Korean_Grill", "North", 2.0),
            ("Neighbor", "Grill", "North", 3.0),
        ];
        for (name, cuisine, region, rating) in seeds {
            h.coordinator.create(name, cuisine, region).await.unwrap();
            h.coordinator.rate(name, rating).await.unwrap();
        }

        for (region, cuisine) in [("North", "Korean_Grill"), ("North_Korean", "Grill")] {
            let expected: Vec<Restaurant> = h
                .coordinator
                .query_by_region(region, QueryLimit::MAX)
                .await
                .unwrap()
                .into_iter()
                .filter(|r| r.cuisine == cuisine)
                .collect();

            // Second round is served from the cache
            for _ in 0..2 {
                let rows = h
                    .coordinator
                    .query_by_region_and_cuisine(region, cuisine, QueryLimit::MAX)
                    .await
                    .unwrap();
                assert_eq!(rows, expected);
            }
        }
        assert!(h.coordinator.stats().hits.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let h = harness(true);
        for i in 0..8 {
            h.coordinator.create(&format!("R{i}"), "Coffee", "Center").await.unwrap();
            h.coordinator.rate(&format!("R{i}"), f64::from(i) / 2.0).await.unwrap();
        }
        let rows = h.coordinator.query_by_cuisine("Coffee", None, QueryLimit::new(5)).await.unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].rating >= w[1].rating));
        assert!(rows.iter().all(|r| r.cuisine == "Coffee"));
    }

    #[tokio::test]
    async fn test_empty_results_not_cached() {
        let h = harness(true);
        assert!(h.coordinator.query_by_region("Nowhere", QueryLimit::DEFAULT).await.is_err());
        assert_eq!(h.coordinator.stats().snapshot().populates, 0);
    }

    #[tokio::test]
    async fn test_evicted_generation_does_not_resurrect_results() {
        let h = harness(true);
        h.coordinator.create("A", "Pizza", "North").await.unwrap();
        h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();

        // Drop the token, then write behind the coordinator's back
        h.cache.invalidate(keys::generation_key(IndexKind::Region, "North").as_str());
        h.store.insert(&Restaurant::new("B", "Pizza", "North")).await.unwrap();

        let rows = h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_kind_is_a_miss() {
        let h = harness(true);
        h.store.insert(&Restaurant::new("A", "Pizza", "North")).await.unwrap();
        let bogus = CacheValue::RestaurantList(vec![]).encode().unwrap();
        h.cache.insert(keys::restaurant_key("A").as_str(), bogus.into());

        let r = h.coordinator.get_by_name("A").await.unwrap();
        assert_eq!(r.name, "A");
        assert_eq!(h.coordinator.stats().hits.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_cache_failures_are_swallowed() {
        let h = harness(true);
        h.cache.fail_next(100);

        h.coordinator.create("A", "Pizza", "North").await.unwrap();
        h.coordinator.rate("A", 4.0).await.unwrap();
        let r = h.coordinator.get_by_name("A").await.unwrap();
        assert!((r.rating - 4.0).abs() < 1e-9);
        let rows = h.coordinator.query_by_region("North", QueryLimit::DEFAULT).await.unwrap();
        assert_eq!(rows.len(), 1);
        h.coordinator.delete("A").await.unwrap();

        assert!(h.coordinator.stats().errors.load(Ordering::Relaxed) > 0);
        assert!(h.cache.is_empty());
    }

    #[test]
    fn test_from_config_honors_switch() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn RestaurantStore> =
            Arc::new(RedbRestaurantStore::open(dir.path().join("t.redb"), "Restaurants").unwrap());
        let cache: Arc<dyn CacheClient> = Arc::new(MemoryCache::default());

        let mut config = Config::default();
        let off = Coordinator::from_config(&config, store.clone(), Some(cache.clone()));
        assert!(!off.caching_enabled());

        config.use_cache = true;
        let on = Coordinator::from_config(&config, store, Some(cache));
        assert!(on.caching_enabled());
    }
}
