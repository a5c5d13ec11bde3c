//! Restaurant store backed by redb.
//!
//! Every mutation rewrites the primary row and all three index rows in a
//! single write transaction. redb admits one writer at a time, so the
//! conditional insert and the rating update are atomic with respect to
//! each other. Blocking database work runs on tokio's blocking pool.

use crate::store::{RestaurantStore, StoreError, StoreResult};
use crate::tables::{Tables, index_key, index_prefix};
use async_trait::async_trait;
use diner_common::{IndexKind, RankedQuery, Restaurant};
use redb::{Database, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

struct Inner {
    db: Database,
    tables: Tables,
}

/// Persistent restaurant store backed by redb.
#[derive(Clone)]
pub struct RedbRestaurantStore {
    inner: Arc<Inner>,
}

impl RedbRestaurantStore {
    /// Open (or create) the database at `path`, using `table_name` as the
    /// store table identifier.
    pub fn open(path: impl AsRef<Path>, table_name: &str) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        let tables = Tables::new(table_name);

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables.primary())?;
            for kind in IndexKind::ALL {
                let _t = write_txn.open_table(tables.index(kind))?;
            }
        }
        write_txn.commit()?;

        debug!("Opened restaurant store '{}' at {}", table_name, path.display());
        Ok(Self {
            inner: Arc::new(Inner { db, tables }),
        })
    }

    /// Run `f` against the database on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database, &Tables) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner.db, &inner.tables)).await?
    }
}

fn decode(bytes: &[u8]) -> StoreResult<Restaurant> {
    Ok(bincode::deserialize(bytes)?)
}

/// Read the current row for `name` inside a write transaction
fn read_row(txn: &WriteTransaction, tables: &Tables, name: &str) -> StoreResult<Option<Restaurant>> {
    let table = txn.open_table(tables.primary())?;
    let row = table.get(name)?.map(|v| decode(v.value())).transpose()?;
    Ok(row)
}

/// Write `restaurant` and its index entries
fn write_row(txn: &WriteTransaction, tables: &Tables, restaurant: &Restaurant) -> StoreResult<()> {
    let bytes = bincode::serialize(restaurant)?;
    txn.open_table(tables.primary())?
        .insert(restaurant.name.as_str(), bytes.as_slice())?;
    for kind in IndexKind::ALL {
        let key = index_key(kind, restaurant);
        txn.open_table(tables.index(kind))?
            .insert(key.as_str(), restaurant.name.as_str())?;
    }
    Ok(())
}

/// Remove `restaurant` and its index entries
fn remove_row(txn: &WriteTransaction, tables: &Tables, restaurant: &Restaurant) -> StoreResult<()> {
    txn.open_table(tables.primary())?
        .remove(restaurant.name.as_str())?;
    for kind in IndexKind::ALL {
        let key = index_key(kind, restaurant);
        txn.open_table(tables.index(kind))?.remove(key.as_str())?;
    }
    Ok(())
}

#[async_trait]
impl RestaurantStore for RedbRestaurantStore {
    async fn insert(&self, restaurant: &Restaurant) -> StoreResult<()> {
        let restaurant = restaurant.clone();
        self.blocking(move |db, tables| {
            let write_txn = db.begin_write()?;
            if read_row(&write_txn, tables, &restaurant.name)?.is_some() {
                // Dropping the transaction aborts it
                return Err(StoreError::AlreadyExists(restaurant.name));
            }
            write_row(&write_txn, tables, &restaurant)?;
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, name: &str) -> StoreResult<Option<Restaurant>> {
        let name = name.to_string();
        self.blocking(move |db, tables| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(tables.primary())?;
            let row = table.get(name.as_str())?.map(|v| decode(v.value())).transpose()?;
            Ok(row)
        })
        .await
    }

    async fn delete(&self, name: &str) -> StoreResult<Option<Restaurant>> {
        let name = name.to_string();
        self.blocking(move |db, tables| {
            let write_txn = db.begin_write()?;
            let Some(existing) = read_row(&write_txn, tables, &name)? else {
                return Ok(None);
            };
            remove_row(&write_txn, tables, &existing)?;
            write_txn.commit()?;
            Ok(Some(existing))
        })
        .await
    }

    async fn add_rating(&self, name: &str, rating: f64) -> StoreResult<Option<Restaurant>> {
        let name = name.to_string();
        self.blocking(move |db, tables| {
            let write_txn = db.begin_write()?;
            let Some(existing) = read_row(&write_txn, tables, &name)? else {
                return Ok(None);
            };
            let mut updated = existing.clone();
            updated.apply_rating(rating);
            // Index keys embed the rating, so the old entries must go
            remove_row(&write_txn, tables, &existing)?;
            write_row(&write_txn, tables, &updated)?;
            write_txn.commit()?;
            Ok(Some(updated))
        })
        .await
    }

    async fn query(&self, query: &RankedQuery) -> StoreResult<Vec<Restaurant>> {
        let query = query.clone();
        self.blocking(move |db, tables| {
            let read_txn = db.begin_read()?;
            let index = read_txn.open_table(tables.index(query.shape.index()))?;
            let primary = read_txn.open_table(tables.primary())?;

            let prefix = index_prefix(&query.shape.label());
            let threshold = query.shape.threshold();
            let limit = query.limit.get();
            let mut result = Vec::with_capacity(limit);

            for entry in index.range(prefix.as_str()..)? {
                let (key, name) = entry?;
                if !key.value().starts_with(prefix.as_str()) || result.len() >= limit {
                    break;
                }
                let Some(row) = primary.get(name.value())? else {
                    error!("Index entry '{}' points at a missing row", key.value());
                    continue;
                };
                let restaurant = decode(row.value())?;
                // A label prefix can also cover longer labels; only the
                // record's own fields decide membership
                if !query.shape.matches(&restaurant) {
                    continue;
                }
                // Rows arrive rating-descending: the first one at or below
                // the threshold ends the scan
                if threshold.is_some_and(|t| !t.admits(restaurant.rating)) {
                    break;
                }
                result.push(restaurant);
            }
            Ok(result)
        })
        .await
    }
}
