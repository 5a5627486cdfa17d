// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{RideShareError, RideShareResult, ValidationError};
use crate::models::ride::check_coordinates;

/// Vehicle and licensing details for a user with the driver role.
/// `driver_id` is the owning user's id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Driver {
    pub driver_id: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_year: Option<i32>,
    pub license_plate: String,
    pub driver_license_number: String,
    pub insurance_details: String,
    pub is_approved: bool,  // Set by an admin after NTSA checks
    pub is_available: bool, // False while holding an in-progress ride
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.current_latitude?, self.current_longitude?))
    }

    pub fn can_accept_rides(&self) -> bool {
        self.is_approved && self.is_available
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverOnboarding {
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_year: Option<i32>,
    pub license_plate: String,
    pub driver_license_number: String,
    pub insurance_details: Option<String>,
}

impl DriverOnboarding {
    pub fn validate(&self) -> RideShareResult<()> {
        let errors: Vec<ValidationError> = [
            ("vehicle_make", &self.vehicle_make),
            ("vehicle_model", &self.vehicle_model),
            ("license_plate", &self.license_plate),
            ("driver_license_number", &self.driver_license_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| ValidationError {
            field: field.to_string(),
            message: format!("{} is required", field),
        })
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RideShareError::ValidationFailed(errors))
        }
    }
}

/// Plates are compared without spaces and case, e.g. "kca 123a" == "KCA123A".
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverLocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
}

impl DriverLocationUpdate {
    pub fn validate(&self) -> RideShareResult<()> {
        let mut errors = Vec::new();
        check_coordinates("", self.latitude, self.longitude, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RideShareError::ValidationFailed(errors))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverApprovalUpdate {
    pub is_approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverAvailabilityUpdate {
    pub is_available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyDriversQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: Option<f64>, // Kilometres, defaults to 5
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DriverLocation {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_location_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyDriver {
    pub driver_id: String,
    pub first_name: String,
    pub last_name: String,
    pub rating: f64,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub license_plate: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_requires_vehicle_and_licence_fields() {
        let onboarding = DriverOnboarding {
            vehicle_make: "Toyota".into(),
            vehicle_model: "".into(),
            vehicle_year: Some(2019),
            license_plate: "KCA 123A".into(),
            driver_license_number: " ".into(),
            insurance_details: None,
        };
        match onboarding.validate() {
            Err(RideShareError::ValidationFailed(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["vehicle_model", "driver_license_number"]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn plates_normalize() {
        assert_eq!(normalize_plate("kca 123a"), "KCA123A");
    }

    #[test]
    fn location_update_rejects_out_of_range() {
        assert!(DriverLocationUpdate { latitude: -1.28, longitude: 36.82 }.validate().is_ok());
        assert!(DriverLocationUpdate { latitude: 91.0, longitude: 36.82 }.validate().is_err());
        assert!(DriverLocationUpdate { latitude: 0.0, longitude: f64::NAN }.validate().is_err());
    }
}
