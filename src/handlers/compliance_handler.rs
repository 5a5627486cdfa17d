// src/handlers/compliance_handler.rs
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::{
    errors::{RideShareError, RideShareResult},
    models::{
        compliance::{
            CommissionBreakdown, CommissionQuery, ComplianceReport, ComplianceStatus, ReportQuery,
            VehicleEligibility, VehicleEligibilityRequest,
        },
        user::Principal,
    },
    state::AppState,
};

pub async fn check_driver(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<ComplianceStatus>> {
    Ok(Json(state.compliance_service.validate_driver_compliance(&caller, &id).await?))
}

pub async fn calculate_commission(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Query(query): Query<CommissionQuery>,
) -> RideShareResult<Json<CommissionBreakdown>> {
    let fare = query
        .fare
        .ok_or_else(|| RideShareError::validation_error("fare", "fare is required"))?;
    Ok(Json(state.compliance_service.calculate_commission(fare)?))
}

pub async fn validate_vehicle(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Json(payload): Json<VehicleEligibilityRequest>,
) -> RideShareResult<Json<VehicleEligibility>> {
    Ok(Json(state.compliance_service.validate_vehicle_eligibility(
        payload.vehicle_year,
        &payload.vehicle_make,
        &payload.vehicle_model,
    )))
}

pub async fn ntsa_report(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Query(query): Query<ReportQuery>,
) -> RideShareResult<Json<ComplianceReport>> {
    let (Some(start), Some(end)) = (query.start_date, query.end_date) else {
        return Err(RideShareError::bad_request("start_date and end_date are required"));
    };
    Ok(Json(state.report_service.generate_compliance_report(&caller, &start, &end).await?))
}
