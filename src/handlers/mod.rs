// src/handlers/mod.rs
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{errors::RideShareResult, state::AppState};

pub mod auth;
pub mod compliance_handler;
pub mod driver_handler;
pub mod payment_handler;
pub mod ride_handler;
pub mod user_handler;

/// Liveness plus a round trip to the store.
pub async fn health_check(State(state): State<Arc<AppState>>) -> RideShareResult<Json<Value>> {
    state.repository.health_check().await?;
    Ok(Json(json!({
        "status": "ok",
        "environment": state.config.environment.to_string(),
        "timestamp": Utc::now(),
    })))
}
