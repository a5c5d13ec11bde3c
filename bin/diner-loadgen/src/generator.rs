//! Restaurant fixtures for a load run

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;

pub const CUISINES: [&str; 5] = ["Italian", "Indian", "Pizza", "Coffee", "Barbecue"];
pub const REGIONS: [&str; 4] = ["Center", "North", "South", "East"];

const ADJECTIVES: [&str; 10] = [
    "Purple", "Yellow", "Orange", "Pink", "Gray", "Brown", "Crimson", "Violet", "Indigo", "Maroon",
];
const NOUNS: [&str; 7] = ["Dragon", "Phoenix", "Tiger", "Bear", "Lion", "Eagle", "Snake"];

/// Body of `POST /restaurants`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewRestaurant {
    pub name: String,
    pub cuisine: String,
    pub region: String,
}

/// Body of `POST /restaurants/rating`
#[derive(Clone, Debug, Serialize)]
pub struct Rating<'a> {
    pub name: &'a str,
    pub rating: f64,
}

/// `{Adjective}_{Noun}_Restaurant`
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or(ADJECTIVES[0]);
    let noun = NOUNS.choose(rng).copied().unwrap_or(NOUNS[0]);
    format!("{adjective}_{noun}_Restaurant")
}

/// `per_cuisine` restaurants for every cuisine, in random regions
pub fn restaurants<R: Rng + ?Sized>(rng: &mut R, per_cuisine: usize) -> Vec<NewRestaurant> {
    CUISINES
        .iter()
        .flat_map(|cuisine| std::iter::repeat(*cuisine).take(per_cuisine))
        .map(|cuisine| NewRestaurant {
            name: random_name(&mut *rng),
            cuisine: cuisine.to_string(),
            region: REGIONS.choose(&mut *rng).copied().unwrap_or(REGIONS[0]).to_string(),
        })
        .collect()
}

/// A whole-star rating in `1..=5`
pub fn random_rating<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    f64::from(rng.gen_range(1u8..=5))
}

/// Ratings to submit: one per name this run created, never for a name that
/// already existed or that the fixtures repeat
pub fn rating_plan<'a>(
    fixtures: &'a [NewRestaurant],
    ratings: &[f64],
    created: &[String],
) -> Vec<Rating<'a>> {
    let mut pending: HashSet<&str> = created.iter().map(String::as_str).collect();
    fixtures
        .iter()
        .zip(ratings)
        .filter(|(restaurant, _)| pending.remove(restaurant.name.as_str()))
        .map(|(restaurant, rating)| Rating {
            name: &restaurant.name,
            rating: *rating,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_names() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let name = random_name(&mut rng);
            let parts: Vec<&str> = name.split('_').collect();
            assert_eq!(parts.len(), 3);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NOUNS.contains(&parts[1]));
            assert_eq!(parts[2], "Restaurant");
        }
    }

    #[test]
    fn test_one_per_cuisine() {
        let mut rng = StdRng::seed_from_u64(1);
        let batch = restaurants(&mut rng, 1);
        assert_eq!(batch.len(), CUISINES.len());
        for (r, cuisine) in batch.iter().zip(CUISINES) {
            assert_eq!(r.cuisine, cuisine);
            assert!(REGIONS.contains(&r.region.as_str()));
        }

        assert_eq!(restaurants(&mut rng, 3).len(), 15);
    }

    #[test]
    fn test_ratings_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let r = random_rating(&mut rng);
            assert!((1.0..=5.0).contains(&r));
            assert!((r - r.round()).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_rating_plan_skips_foreign_and_repeated_names() {
        let fixture = |name: &str| NewRestaurant {
            name: name.to_string(),
            cuisine: "Pizza".to_string(),
            region: "North".to_string(),
        };
        let fixtures = vec![fixture("Mine"), fixture("Theirs"), fixture("Mine"), fixture("Also")];
        let ratings = [1.0, 2.0, 3.0, 4.0];
        let created = vec!["Mine".to_string(), "Also".to_string()];

        let plan = rating_plan(&fixtures, &ratings, &created);
        let pairs: Vec<(&str, f64)> = plan.iter().map(|r| (r.name, r.rating)).collect();
        assert_eq!(pairs, vec![("Mine", 1.0), ("Also", 4.0)]);
    }
}
