// src/models/review.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{RideShareError, RideShareResult};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Review {
    pub id: String,
    pub ride_id: String,
    pub reviewer_id: String, // Passenger or driver
    pub reviewed_id: String, // The other participant
    pub rating: f64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReview {
    pub ride_id: String,
    pub reviewed_id: String,
    pub rating: f64,
    pub comment: Option<String>,
}

impl CreateReview {
    pub fn validate(&self) -> RideShareResult<()> {
        if !self.rating.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(RideShareError::validation_error(
                "rating",
                format!("Rating must be between {} and {}", MIN_RATING, MAX_RATING),
            ));
        }
        Ok(())
    }
}

/// Mean of the given ratings, 0.0 when there are none.
pub fn mean_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    reviews.iter().map(|r| r.rating).sum::<f64>() / reviews.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: f64) -> Review {
        Review {
            id: "rev".into(),
            ride_id: "rid".into(),
            reviewer_id: "a".into(),
            reviewed_id: "b".into(),
            rating,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rating_bounds_are_inclusive() {
        let mk = |rating| CreateReview { ride_id: "r".into(), reviewed_id: "u".into(), rating, comment: None };
        assert!(mk(1.0).validate().is_ok());
        assert!(mk(5.0).validate().is_ok());
        assert!(mk(0.9).validate().is_err());
        assert!(mk(5.1).validate().is_err());
        assert!(mk(f64::NAN).validate().is_err());
    }

    #[test]
    fn mean_of_ratings() {
        assert_eq!(mean_rating(&[]), 0.0);
        assert_eq!(mean_rating(&[review(4.0), review(5.0), review(3.0)]), 4.0);
    }
}
