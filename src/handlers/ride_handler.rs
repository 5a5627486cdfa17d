// src/handlers/ride_handler.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        outcome::Outcome,
        review::{CreateReview, Review},
        ride::{CreateRideRequest, FareEstimate, FareEstimateQuery, Ride, RideCompletion, RideRequest},
        user::Principal,
    },
    state::AppState,
};

pub async fn create_ride_request(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Json(payload): Json<CreateRideRequest>,
) -> RideShareResult<(StatusCode, Json<RideRequest>)> {
    let request = state.ride_service.create_ride_request(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_ride_request(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<RideRequest>> {
    Ok(Json(state.ride_service.get_ride_request(&caller, &id).await?))
}

pub async fn accept_ride_request(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Outcome<Ride>>> {
    Ok(Json(state.ride_service.accept_ride_request(&caller, &id).await?))
}

pub async fn reject_ride_request(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Outcome<RideRequest>>> {
    Ok(Json(state.ride_service.reject_ride_request(&caller, &id).await?))
}

pub async fn cancel_ride_request(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<RideRequest>> {
    Ok(Json(state.ride_service.cancel_ride_request(&caller, &id).await?))
}

pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Ride>> {
    Ok(Json(state.ride_service.get_ride(&caller, &id).await?))
}

pub async fn start_ride(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Ride>> {
    Ok(Json(state.ride_service.start_ride(&caller, &id).await?))
}

pub async fn end_ride(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Outcome<RideCompletion>>> {
    Ok(Json(state.ride_service.end_ride(&caller, &id).await?))
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Json(payload): Json<CreateReview>,
) -> RideShareResult<(StatusCode, Json<Review>)> {
    let review = state.ride_service.create_review(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn estimate_fare(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Query(query): Query<FareEstimateQuery>,
) -> RideShareResult<Json<FareEstimate>> {
    Ok(Json(state.ride_service.estimate_fare(&query)?))
}
