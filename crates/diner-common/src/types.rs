//! Core type definitions for Diner
//!
//! This module defines the restaurant entity, its public JSON view, and the
//! ranked query shapes served by the secondary indexes.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};

/// Lowest rating a client may submit
pub const MIN_RATING: f64 = 0.0;

/// Highest rating a client may submit
pub const MAX_RATING: f64 = 5.0;

/// Build the composite region-cuisine label (e.g. `North_Italian`).
///
/// `_`, `%` and NUL inside either part are percent-escaped, so the only bare
/// `_` is the separator and distinct pairs never share a label.
#[must_use]
pub fn region_cuisine_label(region: &str, cuisine: &str) -> String {
    format!("{}_{}", escape_label_part(region), escape_label_part(cuisine))
}

fn escape_label_part(part: &str) -> Cow<'_, str> {
    if !part.contains(['_', '%', '\0']) {
        return Cow::Borrowed(part);
    }
    let mut out = String::with_capacity(part.len() + 8);
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '\0' => out.push_str("%00"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// A restaurant as persisted by the store and held by the cache.
///
/// The name is the primary key and never changes. `rating` is the running
/// average of every submitted rating and is `0.0` while `rating_count == 0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub name: String,
    pub cuisine: String,
    pub region: String,
    pub rating: f64,
    pub rating_count: u64,
}

impl Restaurant {
    /// Create an unrated restaurant
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        cuisine: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cuisine: cuisine.into(),
            region: region.into(),
            rating: 0.0,
            rating_count: 0,
        }
    }

    /// Derived region-cuisine label used by the composite index
    #[must_use]
    pub fn region_cuisine(&self) -> String {
        region_cuisine_label(&self.region, &self.cuisine)
    }

    /// Fold one more rating into the running average.
    ///
    /// `new_rating = (rating * count + incoming) / (count + 1)`
    #[allow(clippy::cast_precision_loss)]
    pub fn apply_rating(&mut self, incoming: f64) {
        let count = self.rating_count as f64;
        let new_count = self.rating_count + 1;
        self.rating = self.rating.mul_add(count, incoming) / new_count as f64;
        self.rating_count = new_count;
    }

    /// The public JSON view of this restaurant
    #[must_use]
    pub fn view(&self) -> RestaurantView {
        RestaurantView::from(self)
    }
}

/// Public representation returned by the HTTP API
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestaurantView {
    pub name: String,
    pub cuisine: String,
    pub rating: f64,
    pub region: String,
}

impl From<&Restaurant> for RestaurantView {
    fn from(r: &Restaurant) -> Self {
        Self {
            name: r.name.clone(),
            cuisine: r.cuisine.clone(),
            rating: r.rating,
            region: r.region.clone(),
        }
    }
}

/// Validate a submitted rating
///
/// # Errors
/// Returns `Error::InvalidArgument` for non-finite values or values outside
/// `[MIN_RATING, MAX_RATING]`.
pub fn validate_rating(rating: f64) -> Result<f64> {
    if rating.is_finite() && (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(Error::invalid_argument(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )))
    }
}

/// Number of rows a ranked query may return.
///
/// Absent, unparseable, zero and negative requests fall back to
/// [`QueryLimit::DEFAULT`]; requests above [`QueryLimit::MAX`] are capped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct QueryLimit(usize);

impl QueryLimit {
    /// Limit applied when the client does not ask for one
    pub const DEFAULT: Self = Self(10);
    /// Largest limit ever applied
    pub const MAX: Self = Self(100);

    /// Normalize a requested limit
    #[must_use]
    pub fn new(requested: i64) -> Self {
        if requested <= 0 {
            Self::DEFAULT
        } else {
            usize::try_from(requested).map_or(Self::MAX, |n| Self(n.min(Self::MAX.0)))
        }
    }

    /// Normalize a raw query-string value
    #[must_use]
    pub fn from_param(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map_or(Self::DEFAULT, Self::new)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl Default for QueryLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Exclusive lower bound on rating for cuisine queries.
///
/// Only finite, strictly positive thresholds exist; anything else means
/// "no threshold".
#[derive(Clone, Copy, Debug, PartialEq, Display)]
#[display("{_0}")]
pub struct RatingThreshold(f64);

impl RatingThreshold {
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    /// Parse a raw query-string value
    #[must_use]
    pub fn from_param(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(Self::new)
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// True if `rating` survives this threshold
    #[must_use]
    pub fn admits(self, rating: f64) -> bool {
        rating > self.0
    }
}

/// Secondary index backing a ranked query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Cuisine,
    Region,
    RegionCuisine,
}

impl IndexKind {
    pub const ALL: [Self; 3] = [Self::Cuisine, Self::Region, Self::RegionCuisine];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cuisine => "Cuisine",
            Self::Region => "Region",
            Self::RegionCuisine => "RegionCuisine",
        }
    }

    /// The label of `restaurant` in this index
    #[must_use]
    pub fn label_of(&self, restaurant: &Restaurant) -> String {
        match self {
            Self::Cuisine => restaurant.cuisine.clone(),
            Self::Region => restaurant.region.clone(),
            Self::RegionCuisine => restaurant.region_cuisine(),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a ranked query selects, independent of its limit
#[derive(Clone, Debug, PartialEq)]
pub enum QueryShape {
    Cuisine {
        cuisine: String,
        threshold: Option<RatingThreshold>,
    },
    Region {
        region: String,
    },
    RegionCuisine {
        region: String,
        cuisine: String,
    },
}

impl QueryShape {
    #[must_use]
    pub const fn index(&self) -> IndexKind {
        match self {
            Self::Cuisine { .. } => IndexKind::Cuisine,
            Self::Region { .. } => IndexKind::Region,
            Self::RegionCuisine { .. } => IndexKind::RegionCuisine,
        }
    }

    /// Index label this shape scans
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Cuisine { cuisine, .. } => cuisine.clone(),
            Self::Region { region } => region.clone(),
            Self::RegionCuisine { region, cuisine } => region_cuisine_label(region, cuisine),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> Option<RatingThreshold> {
        match self {
            Self::Cuisine { threshold, .. } => *threshold,
            _ => None,
        }
    }

    /// True if `restaurant` belongs to this shape (ignoring any threshold)
    #[must_use]
    pub fn matches(&self, restaurant: &Restaurant) -> bool {
        match self {
            Self::Cuisine { cuisine, .. } => restaurant.cuisine == *cuisine,
            Self::Region { region } => restaurant.region == *region,
            Self::RegionCuisine { region, cuisine } => {
                restaurant.region == *region && restaurant.cuisine == *cuisine
            }
        }
    }
}

/// A ranked query: rating-descending rows of one shape, at most `limit`
#[derive(Clone, Debug, PartialEq)]
pub struct RankedQuery {
    pub shape: QueryShape,
    pub limit: QueryLimit,
}

impl RankedQuery {
    #[must_use]
    pub fn by_cuisine(
        cuisine: impl Into<String>,
        threshold: Option<RatingThreshold>,
        limit: QueryLimit,
    ) -> Self {
        Self {
            shape: QueryShape::Cuisine {
                cuisine: cuisine.into(),
                threshold,
            },
            limit,
        }
    }

    #[must_use]
    pub fn by_region(region: impl Into<String>, limit: QueryLimit) -> Self {
        Self {
            shape: QueryShape::Region {
                region: region.into(),
            },
            limit,
        }
    }

    #[must_use]
    pub fn by_region_and_cuisine(
        region: impl Into<String>,
        cuisine: impl Into<String>,
        limit: QueryLimit,
    ) -> Self {
        Self {
            shape: QueryShape::RegionCuisine {
                region: region.into(),
                cuisine: cuisine.into(),
            },
            limit,
        }
    }
}
