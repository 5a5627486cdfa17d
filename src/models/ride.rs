// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{RideShareError, RideShareResult, ValidationError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideRequestStatus {
    Pending,   // Waiting for a driver
    Accepted,  // A driver took it, a Ride exists
    Rejected,  // Declined by a driver
    Cancelled, // Withdrawn by the passenger
    Completed, // The resulting Ride completed
}

impl RideRequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideRequestStatus::Rejected | RideRequestStatus::Cancelled | RideRequestStatus::Completed
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for RideRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RideRequestStatus::Pending => "pending",
            RideRequestStatus::Accepted => "accepted",
            RideRequestStatus::Rejected => "rejected",
            RideRequestStatus::Cancelled => "cancelled",
            RideRequestStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RideRequest {
    pub id: String,
    pub passenger_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub status: RideRequestStatus,

    // Computed once at creation
    pub estimated_fare: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: i64,

    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ride {
    pub id: String,
    pub request_id: String,
    pub driver_id: String,
    pub passenger_id: String,
    pub status: RideStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    // Set when the ride completes
    pub actual_fare: Option<f64>,
    pub actual_distance_km: Option<f64>,
    pub actual_duration_minutes: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn involves(&self, user_id: &str) -> bool {
        self.driver_id == user_id || self.passenger_id == user_id
    }

    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRideRequest {
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
}

impl CreateRideRequest {
    pub fn validate(&self) -> RideShareResult<()> {
        let mut errors = Vec::new();
        check_coordinates("pickup_", self.pickup_latitude, self.pickup_longitude, &mut errors);
        check_coordinates("dropoff_", self.dropoff_latitude, self.dropoff_longitude, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RideShareError::ValidationFailed(errors))
        }
    }
}

/// Push an error per out-of-range or non-finite coordinate.
pub(crate) fn check_coordinates(prefix: &str, latitude: f64, longitude: f64, errors: &mut Vec<ValidationError>) {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        errors.push(ValidationError {
            field: format!("{}latitude", prefix),
            message: "Latitude must be between -90 and 90".to_string(),
        });
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        errors.push(ValidationError {
            field: format!("{}longitude", prefix),
            message: "Longitude must be between -180 and 180".to_string(),
        });
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FareEstimateQuery {
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FareEstimate {
    pub distance_km: f64,
    pub duration_minutes: i64,
    pub estimated_fare: f64,
    pub time_based_fare: f64,
    pub is_rush_hour: bool,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RideCompletion {
    pub ride: Ride,
    pub payment_id: String,
    pub total_fare: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_like_the_wire_format() {
        assert_eq!(serde_json::to_string(&RideStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(serde_json::to_string(&RideRequestStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(RideStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn terminal_request_states() {
        assert!(!RideRequestStatus::Pending.is_terminal());
        assert!(!RideRequestStatus::Accepted.is_terminal());
        assert!(RideRequestStatus::Rejected.is_terminal());
        assert!(RideRequestStatus::Cancelled.is_terminal());
        assert!(RideRequestStatus::Completed.is_terminal());
    }

    #[test]
    fn create_request_validates_both_points() {
        let request = CreateRideRequest {
            pickup_latitude: -1.28,
            pickup_longitude: 200.0,
            dropoff_latitude: -95.0,
            dropoff_longitude: 36.9,
            pickup_address: None,
            dropoff_address: None,
        };
        match request.validate() {
            Err(RideShareError::ValidationFailed(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["pickup_longitude", "dropoff_latitude"]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }
}
