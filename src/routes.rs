// src/routes.rs
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{self, compliance_handler, driver_handler, payment_handler, ride_handler, user_handler};
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Accounts
        .route("/register", post(user_handler::register))
        .route("/login", post(user_handler::login))
        .route("/users/:id", get(user_handler::get_user).put(user_handler::update_user))
        .route("/users/:id/rides", get(user_handler::get_user_rides))
        .route("/users/:id/reviews", get(user_handler::get_user_reviews))
        // Drivers
        .route("/drivers/onboard", post(driver_handler::onboard_driver))
        .route("/drivers/location/:id", get(driver_handler::get_location))
        .route("/drivers/:id", get(driver_handler::get_driver))
        .route("/drivers/:id/approval", put(driver_handler::set_approval))
        .route("/drivers/:id/location", put(driver_handler::update_location))
        .route("/drivers/:id/availability", put(driver_handler::set_availability))
        // Ride requests and rides
        .route("/ride_requests", post(ride_handler::create_ride_request))
        .route("/ride_requests/nearby_drivers", get(driver_handler::nearby_drivers))
        .route("/ride_requests/:id", get(ride_handler::get_ride_request))
        .route("/ride_requests/:id/accept", put(ride_handler::accept_ride_request))
        .route("/ride_requests/:id/reject", put(ride_handler::reject_ride_request))
        .route("/ride_requests/:id/cancel", put(ride_handler::cancel_ride_request))
        .route("/rides/:id", get(ride_handler::get_ride))
        .route("/rides/:id/start", put(ride_handler::start_ride))
        .route("/rides/:id/end", put(ride_handler::end_ride))
        .route("/reviews", post(ride_handler::create_review))
        .route("/fares/estimate", get(ride_handler::estimate_fare))
        // Payments
        .route("/payments/mpesa/stk_push", post(payment_handler::initiate_stk_push))
        .route("/payments/mpesa/callback", post(payment_handler::mpesa_callback))
        .route("/payments/:id", get(payment_handler::get_payment))
        // Compliance
        .route("/compliance/drivers/:id/check", get(compliance_handler::check_driver))
        .route("/compliance/commission/calculate", get(compliance_handler::calculate_commission))
        .route("/compliance/vehicles/validate", post(compliance_handler::validate_vehicle))
        .route("/compliance/reports/ntsa", get(compliance_handler::ntsa_report));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(API_PREFIX, api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
