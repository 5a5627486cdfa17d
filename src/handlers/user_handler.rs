// src/handlers/user_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        outcome::Outcome,
        review::Review,
        ride::Ride,
        user::{LoginResponse, Principal, UserLogin, UserRegistration, UserResponse, UserUpdate},
    },
    services::identity_service::UserOperations,
    state::AppState,
};

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserRegistration>,
) -> RideShareResult<(StatusCode, Json<Outcome<UserResponse>>)> {
    let created = state.identity.register_user(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserLogin>,
) -> RideShareResult<Json<LoginResponse>> {
    Ok(Json(state.identity.login_user(payload).await?))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<UserResponse>> {
    Ok(Json(state.identity.get_user(&caller, &id).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> RideShareResult<Json<UserResponse>> {
    Ok(Json(state.identity.update_user(&caller, &id, payload).await?))
}

pub async fn get_user_rides(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Vec<Ride>>> {
    Ok(Json(state.ride_service.get_rides_for_user(&caller, &id).await?))
}

pub async fn get_user_reviews(
    State(state): State<Arc<AppState>>,
    _caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Vec<Review>>> {
    Ok(Json(state.ride_service.get_reviews_for_user(&id).await?))
}
