// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::services::SchedulingEngine;

pub fn appointment_routes(engine: Arc<SchedulingEngine>) -> Router {
    Router::new()
        // Booking
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))

        // Lifecycle
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/no-show", post(handlers::mark_no_show))

        // Risk and interventions
        .route("/{appointment_id}/score", post(handlers::score_appointment))
        .route("/{appointment_id}/risk", get(handlers::get_risk))
        .route("/{appointment_id}/acknowledge", post(handlers::acknowledge_reminder))
        .route("/{appointment_id}/interventions", get(handlers::get_interventions))
        .route("/high-risk", get(handlers::get_high_risk_appointments))
        .route("/follow-ups", post(handlers::run_follow_ups))
        .route("/recompute", post(handlers::run_recompute))
        .with_state(engine)
}
