// src/services/compliance_service.rs
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        compliance::{
            CommissionBreakdown, ComplianceStatus, VehicleEligibility, MAX_VEHICLE_AGE_YEARS,
            MIN_VEHICLE_YEAR,
        },
        driver::Driver,
        user::Principal,
    },
    services::repository::Repository,
};

#[async_trait]
pub trait ComplianceOperations: Send + Sync {
    async fn validate_driver_compliance(&self, caller: &Principal, driver_id: &str) -> RideShareResult<ComplianceStatus>;
    fn calculate_commission(&self, fare: f64) -> RideShareResult<CommissionBreakdown>;
    fn validate_vehicle_eligibility(&self, year: i32, make: &str, model: &str) -> VehicleEligibility;
}

pub struct ComplianceService {
    repository: Arc<dyn Repository>,
}

impl ComplianceService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

/// NTSA checklist for an onboarded driver; every failing item is reported.
pub fn driver_compliance_issues(driver: &Driver) -> Vec<String> {
    let blank = |s: &str| s.trim().is_empty();
    let mut issues = Vec::new();

    if !driver.is_approved {
        issues.push("Driver not approved by NTSA".to_string());
    }
    if blank(&driver.driver_license_number) {
        issues.push("Driver license number missing".to_string());
    }
    if blank(&driver.license_plate) {
        issues.push("Vehicle license plate missing".to_string());
    }
    if blank(&driver.vehicle_make) || blank(&driver.vehicle_model) {
        issues.push("Vehicle details incomplete".to_string());
    }
    if blank(&driver.insurance_details) {
        issues.push("Insurance details missing".to_string());
    }
    issues
}

/// Eligibility against a fixed model-year floor; the age in the message is
/// relative to `current_year`.
pub fn vehicle_eligibility(year: i32, make: &str, model: &str, current_year: i32) -> VehicleEligibility {
    let mut issues = Vec::new();

    if year < MIN_VEHICLE_YEAR {
        issues.push(format!(
            "Vehicle too old: {} years (max {} years)",
            current_year - year,
            MAX_VEHICLE_AGE_YEARS
        ));
    }
    if make.trim().is_empty() || model.trim().is_empty() {
        issues.push("Vehicle make and model required".to_string());
    }

    VehicleEligibility {
        is_eligible: issues.is_empty(),
        issues,
        max_age_years: MAX_VEHICLE_AGE_YEARS,
    }
}

#[async_trait]
impl ComplianceOperations for ComplianceService {
    async fn validate_driver_compliance(&self, caller: &Principal, driver_id: &str) -> RideShareResult<ComplianceStatus> {
        caller.require_self_or_admin(driver_id)?;

        let driver = self
            .repository
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| RideShareError::DriverNotFound(driver_id.to_string()))?;

        let issues = driver_compliance_issues(&driver);
        if !issues.is_empty() {
            tracing::info!("Driver {} has {} compliance issues", driver_id, issues.len());
        }

        Ok(ComplianceStatus {
            driver_id: driver.driver_id,
            is_compliant: issues.is_empty(),
            issues,
            last_checked: Utc::now(),
        })
    }

    fn calculate_commission(&self, fare: f64) -> RideShareResult<CommissionBreakdown> {
        if !fare.is_finite() || fare < 0.0 {
            return Err(RideShareError::validation_error("fare", "Fare must be a non-negative amount"));
        }
        Ok(CommissionBreakdown::for_fare(fare))
    }

    fn validate_vehicle_eligibility(&self, year: i32, make: &str, model: &str) -> VehicleEligibility {
        vehicle_eligibility(year, make, model, Utc::now().year())
    }
}
