// src/handlers/driver_handler.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        driver::{
            Driver, DriverApprovalUpdate, DriverAvailabilityUpdate, DriverLocation, DriverLocationUpdate,
            DriverOnboarding, NearbyDriver, NearbyDriversQuery,
        },
        user::Principal,
    },
    state::AppState,
};

pub async fn onboard_driver(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Json(payload): Json<DriverOnboarding>,
) -> RideShareResult<(StatusCode, Json<Driver>)> {
    let driver = state.driver_service.onboard_driver(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Driver>> {
    Ok(Json(state.driver_service.get_driver(&id).await?))
}

pub async fn set_approval(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
    Json(payload): Json<DriverApprovalUpdate>,
) -> RideShareResult<Json<Driver>> {
    Ok(Json(state.driver_service.set_approval(&caller, &id, payload).await?))
}

pub async fn update_location(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
    Json(payload): Json<DriverLocationUpdate>,
) -> RideShareResult<Json<DriverLocation>> {
    Ok(Json(state.driver_service.update_location(&caller, &id, payload).await?))
}

pub async fn get_location(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<DriverLocation>> {
    Ok(Json(state.driver_service.get_location(&id).await?))
}

pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
    Json(payload): Json<DriverAvailabilityUpdate>,
) -> RideShareResult<Json<Driver>> {
    Ok(Json(state.driver_service.set_availability(&caller, &id, payload).await?))
}

pub async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Query(query): Query<NearbyDriversQuery>,
) -> RideShareResult<Json<Vec<NearbyDriver>>> {
    Ok(Json(state.driver_service.find_nearby_drivers(query).await?))
}
