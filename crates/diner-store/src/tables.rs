//! Redb table layout.
//!
//! Table names derive from the configured table identifier so several
//! directories can share one database file:
//!
//! - `{table}`: name → bincode `Restaurant`
//! - `{table}.cuisine_idx`, `{table}.region_idx`, `{table}.region_cuisine_idx`:
//!   `"{label}\x00{inverted_rating:016x}\x00{name}"` → name

use diner_common::{IndexKind, Restaurant};
use redb::TableDefinition;

/// Owned table names for one directory
#[derive(Clone, Debug)]
pub struct Tables {
    primary: String,
    cuisine_idx: String,
    region_idx: String,
    region_cuisine_idx: String,
}

impl Tables {
    #[must_use]
    pub fn new(table_name: &str) -> Self {
        Self {
            primary: table_name.to_string(),
            cuisine_idx: format!("{table_name}.cuisine_idx"),
            region_idx: format!("{table_name}.region_idx"),
            region_cuisine_idx: format!("{table_name}.region_cuisine_idx"),
        }
    }

    pub fn primary(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.primary)
    }

    pub fn index(&self, kind: IndexKind) -> TableDefinition<'_, &'static str, &'static str> {
        let name = match kind {
            IndexKind::Cuisine => &self.cuisine_idx,
            IndexKind::Region => &self.region_idx,
            IndexKind::RegionCuisine => &self.region_cuisine_idx,
        };
        TableDefinition::new(name)
    }
}

/// Prefix shared by every index entry under `label`
pub(crate) fn index_prefix(label: &str) -> String {
    format!("{label}\x00")
}

/// Index key for `restaurant` in index `kind`.
///
/// Ratings are non-negative, so their IEEE-754 bit patterns order like the
/// values; inverting them makes an ascending scan rating-descending.
pub(crate) fn index_key(kind: IndexKind, restaurant: &Restaurant) -> String {
    let label = kind.label_of(restaurant);
    let inverted = !restaurant.rating.to_bits();
    format!("{label}\x00{inverted:016x}\x00{}", restaurant.name)
}
