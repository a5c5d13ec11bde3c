//! Values stored in the cache

use bytes::Bytes;
use diner_common::{Error, Restaurant, Result};
use serde::{Deserialize, Serialize};

/// A cached snapshot: one restaurant, or the rows of a ranked query.
///
/// Serialized as JSON with an explicit `kind` tag, so a reader can tell what
/// it got back without trusting the key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CacheValue {
    Restaurant(Restaurant),
    RestaurantList(Vec<Restaurant>),
}

impl CacheValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Restaurant(_) => "Restaurant",
            Self::RestaurantList(_) => "RestaurantList",
        }
    }

    /// The single restaurant, or `self` back if this is a list
    ///
    /// # Errors
    /// Returns the value unchanged when the tag does not match.
    pub fn into_restaurant(self) -> std::result::Result<Restaurant, Self> {
        match self {
            Self::Restaurant(r) => Ok(r),
            other => Err(other),
        }
    }

    /// The ranked rows, or `self` back if this is a single restaurant
    ///
    /// # Errors
    /// Returns the value unchanged when the tag does not match.
    pub fn into_list(self) -> std::result::Result<Vec<Restaurant>, Self> {
        match self {
            Self::RestaurantList(rows) => Ok(rows),
            other => Err(other),
        }
    }

    /// # Errors
    /// Returns `Error::Serialization` if JSON encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// # Errors
    /// Returns `Error::Serialization` for bytes that are not a tagged value.
    pub fn decode(bytes: &Bytes) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
