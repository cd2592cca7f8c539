use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{self, DoctorCellState};

pub fn doctor_routes(state: Arc<DoctorCellState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_doctors).post(handlers::register_doctor))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/working-hours", put(handlers::replace_working_hours))
        .route("/{doctor_id}/deactivate", post(handlers::deactivate_doctor))
        .route("/{doctor_id}/reactivate", post(handlers::reactivate_doctor))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/appointments", get(handlers::get_doctor_day))
        .with_state(state)
}
