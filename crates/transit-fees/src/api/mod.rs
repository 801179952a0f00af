//! HTTP surface of the engine

pub mod routes;

use crate::server::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn routes(state: AppState) -> Router {
    Router::new()
        // Gateway callback / return flow
        .route("/payments/verify", post(routes::payments::verify_payment))
        .route("/payments/orders", post(routes::payments::place_order))
        .route(
            "/students/:student_id/payments",
            get(routes::payments::payment_history),
        )
        // Booking decisions
        .route("/eligibility", post(routes::eligibility::check_eligibility))
        .route("/calendar/:date", get(routes::eligibility::resolve_term))
        .route("/bookings", post(routes::bookings::create_booking))
        // Fee administration
        .route("/fee-schedules", put(routes::fees::publish_fee_schedule))
        .route("/health", get(routes::health::health_check))
        .with_state(state)
}
