// src/handlers/auth.rs
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use crate::{
    errors::RideShareError,
    models::user::Principal,
    services::identity_service::IdentityProvider,
    state::AppState,
};

/// Resolve `Authorization: Bearer <token>` to the calling user.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = RideShareError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RideShareError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RideShareError::unauthorized("Expected a Bearer token"))?;

        state.identity.authenticate(token).await
    }
}
