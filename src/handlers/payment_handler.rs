// src/handlers/payment_handler.rs
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    errors::RideShareResult,
    models::{
        payment::{Payment, StkPushRequest, StkPushResponse},
        user::Principal,
    },
    state::AppState,
};

pub async fn initiate_stk_push(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Json(payload): Json<StkPushRequest>,
) -> RideShareResult<Json<StkPushResponse>> {
    Ok(Json(state.payment_service.initiate_stk_push(&caller, payload).await?))
}

/// Safaricom webhook. Unauthenticated; acknowledged in Daraja's own format.
pub async fn mpesa_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> RideShareResult<Json<Value>> {
    state.payment_service.handle_callback(payload).await?;
    Ok(Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" })))
}

pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    caller: Principal,
    Path(id): Path<String>,
) -> RideShareResult<Json<Payment>> {
    Ok(Json(state.payment_service.get_payment(&caller, &id).await?))
}
