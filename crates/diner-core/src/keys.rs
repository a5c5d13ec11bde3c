//! Cache key derivation
//!
//! Keys are plain strings built from the semantic identity of a read:
//!
//! - `Restaurant-{name}`
//! - `Top-{limit}-Cuisine-{cuisine}-Restaurants[-ratingGreaterThan-{t}]@{generation}`
//! - `Top-{limit}-Region-{region}-Restaurants@{generation}`
//! - `Top-{limit}-RegionCuisine-{region}_{cuisine}-Restaurants@{generation}`
//! - `Generation-{Cuisine|Region|RegionCuisine}-{label}`
//!
//! Client-supplied components that are not plain printable ASCII are
//! percent-encoded, and any key too long for memcached is replaced by a
//! SHA-256 digest under the same prefix.

use diner_cache::protocol::MAX_KEY_LEN;
use diner_common::{IndexKind, QueryShape, RankedQuery};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;

/// A derived, memcached-safe cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn finish(prefix: &str, key: String) -> Self {
        if key.len() <= MAX_KEY_LEN {
            return Self(key);
        }
        let digest = Sha256::digest(key.as_bytes());
        Self(format!("{prefix}-sha256:{}", hex::encode(digest)))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Percent-encode a client-supplied component unless it is already safe.
///
/// `%` forces encoding, so an encoded component can never equal a raw one.
fn escape(component: &str) -> Cow<'_, str> {
    if component.bytes().all(|b| b.is_ascii_graphic() && b != b'%') {
        Cow::Borrowed(component)
    } else {
        urlencoding::encode(component)
    }
}

/// Key of the single-entity entry for `name`
#[must_use]
pub fn restaurant_key(name: &str) -> CacheKey {
    CacheKey::finish("Restaurant", format!("Restaurant-{}", escape(name)))
}

/// Key holding the current generation token of one index label
#[must_use]
pub fn generation_key(kind: IndexKind, label: &str) -> CacheKey {
    let prefix = format!("Generation-{kind}");
    let key = format!("{prefix}-{}", escape(label));
    CacheKey::finish(&prefix, key)
}

/// Key of a ranked query result under `generation`
#[must_use]
pub fn query_key(query: &RankedQuery, generation: &str) -> CacheKey {
    let limit = query.limit;
    let prefix = format!("Top-{limit}-{}", query.shape.index());
    let body = match &query.shape {
        QueryShape::Cuisine { cuisine, threshold } => {
            let base = format!("{prefix}-{}-Restaurants", escape(cuisine));
            match threshold {
                Some(t) => format!("{base}-ratingGreaterThan-{t}"),
                None => base,
            }
        }
        QueryShape::Region { region } => format!("{prefix}-{}-Restaurants", escape(region)),
        QueryShape::RegionCuisine { .. } => {
            format!("{prefix}-{}-Restaurants", escape(&query.shape.label()))
        }
    };
    CacheKey::finish(&prefix, format!("{body}@{generation}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diner_common::{QueryLimit, RatingThreshold};

    #[test]
    fn test_restaurant_key() {
        assert_eq!(restaurant_key("RestaurantA").as_str(), "Restaurant-RestaurantA");
    }

    #[test]
    fn test_cuisine_keys() {
        let q = RankedQuery::by_cuisine("Italian", None, QueryLimit::DEFAULT);
        assert_eq!(
            query_key(&q, "g1").as_str(),
            "Top-10-Cuisine-Italian-Restaurants@g1"
        );

        let q = RankedQuery::by_cuisine("Italian", RatingThreshold::new(3.0), QueryLimit::new(5));
        assert_eq!(
            query_key(&q, "g1").as_str(),
            "Top-5-Cuisine-Italian-Restaurants-ratingGreaterThan-3@g1"
        );

        let q = RankedQuery::by_cuisine("Italian", RatingThreshold::new(3.5), QueryLimit::new(5));
        assert!(query_key(&q, "g1").as_str().contains("-ratingGreaterThan-3.5@"));
    }

    #[test]
    fn test_region_keys() {
        let q = RankedQuery::by_region("North", QueryLimit::new(20));
        assert_eq!(query_key(&q, "g").as_str(), "Top-20-Region-North-Restaurants@g");

        let q = RankedQuery::by_region_and_cuisine("North", "Italian", QueryLimit::DEFAULT);
        assert_eq!(
            query_key(&q, "g").as_str(),
            "Top-10-RegionCuisine-North_Italian-Restaurants@g"
        );
    }

    #[test]
    fn test_shapes_do_not_collide() {
        // A cuisine and a region sharing a label
        let by_cuisine = RankedQuery::by_cuisine("Center", None, QueryLimit::DEFAULT);
        let by_region = RankedQuery::by_region("Center", QueryLimit::DEFAULT);
        assert_ne!(query_key(&by_cuisine, "g"), query_key(&by_region, "g"));
    }

    #[test]
    fn test_region_cuisine_pairs_do_not_collide() {
        let a = RankedQuery::by_region_and_cuisine("North_Korean", "Grill", QueryLimit::DEFAULT);
        let b = RankedQuery::by_region_and_cuisine("North", "Korean_Grill", QueryLimit::DEFAULT);
        assert_ne!(query_key(&a, "g"), query_key(&b, "g"));
        assert_ne!(
            generation_key(IndexKind::RegionCuisine, &a.shape.label()),
            generation_key(IndexKind::RegionCuisine, &b.shape.label())
        );
        assert!(diner_cache::protocol::is_valid_key(query_key(&a, "g").as_str()));
    }

    #[test]
    fn test_limit_and_generation_distinguish_keys() {
        let a = RankedQuery::by_region("North", QueryLimit::new(5));
        let b = RankedQuery::by_region("North", QueryLimit::new(6));
        assert_ne!(query_key(&a, "g"), query_key(&b, "g"));
        assert_ne!(query_key(&a, "g1"), query_key(&a, "g2"));
    }

    #[test]
    fn test_generation_keys() {
        assert_eq!(
            generation_key(IndexKind::Cuisine, "Italian").as_str(),
            "Generation-Cuisine-Italian"
        );
        assert_eq!(
            generation_key(IndexKind::RegionCuisine, "North_Italian").as_str(),
            "Generation-RegionCuisine-North_Italian"
        );
    }

    #[test]
    fn test_unsafe_components_are_encoded() {
        let key = restaurant_key("Chez Café");
        assert_eq!(key.as_str(), "Restaurant-Chez%20Caf%C3%A9");
        assert!(diner_cache::protocol::is_valid_key(key.as_str()));

        // A literal percent sequence does not collide with its decoded form
        assert_ne!(restaurant_key("Chez%20Caf%C3%A9"), key);
    }

    #[test]
    fn test_long_keys_are_hashed() {
        let name = "x".repeat(300);
        let key = restaurant_key(&name);
        assert!(key.as_str().starts_with("Restaurant-sha256:"));
        assert_eq!(key.as_str().len(), "Restaurant-sha256:".len() + 64);
        assert_eq!(key, restaurant_key(&name));
        assert_ne!(key, restaurant_key(&"y".repeat(300)));

        let q = RankedQuery::by_cuisine("c".repeat(300), None, QueryLimit::DEFAULT);
        let key = query_key(&q, "g");
        assert!(key.as_str().starts_with("Top-10-Cuisine-sha256:"));
        assert!(diner_cache::protocol::is_valid_key(key.as_str()));
    }
}
