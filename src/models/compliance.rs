// src/models/compliance.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::payment::CURRENCY_KES;

/// Platform commission, capped by Kenyan regulation.
pub const COMMISSION_RATE: f64 = 0.18;
pub const MAX_VEHICLE_AGE_YEARS: i32 = 10;
pub const MIN_VEHICLE_YEAR: i32 = 2015;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComplianceStatus {
    pub driver_id: String,
    pub is_compliant: bool,
    pub issues: Vec<String>,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommissionBreakdown {
    pub total_fare: f64,
    pub commission_rate: f64,
    pub commission_amount: f64,
    pub driver_earnings: f64,
    pub currency: String,
}

impl CommissionBreakdown {
    pub fn for_fare(fare: f64) -> Self {
        let commission_amount = fare * COMMISSION_RATE;
        Self {
            total_fare: fare,
            commission_rate: COMMISSION_RATE,
            commission_amount,
            driver_earnings: fare - commission_amount,
            currency: CURRENCY_KES.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VehicleEligibility {
    pub is_eligible: bool,
    pub issues: Vec<String>,
    pub max_age_years: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VehicleEligibilityRequest {
    pub vehicle_year: i32,
    #[serde(default)]
    pub vehicle_make: String,
    #[serde(default)]
    pub vehicle_model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommissionQuery {
    pub fare: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComplianceReport {
    pub report_period: String,
    pub generated_at: DateTime<Utc>,
    pub total_rides: usize,
    pub total_revenue: f64,
    pub rides: Vec<NtsaRideData>,
}

/// One completed ride as reported to the NTSA.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NtsaRideData {
    pub ride_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub passenger_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<i64>,
    pub fare: Option<f64>,
    pub commission_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_for_a_thousand_shillings() {
        let breakdown = CommissionBreakdown::for_fare(1000.0);
        assert!((breakdown.commission_amount - 180.0).abs() < 1e-9);
        assert!((breakdown.driver_earnings - 820.0).abs() < 1e-9);
        assert_eq!(breakdown.commission_rate, 0.18);
        assert_eq!(breakdown.currency, "KES");
    }

    #[test]
    fn commission_parts_sum_to_fare() {
        for fare in [100.0, 137.5, 999.99, 12_345.67] {
            let b = CommissionBreakdown::for_fare(fare);
            assert!((b.commission_amount + b.driver_earnings - b.total_fare).abs() < 1e-9);
        }
    }
}
