use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers::{self, PatientCellState};

pub fn patient_routes(state: Arc<PatientCellState>) -> Router {
    Router::new()
        .route("/", axum::routing::post(handlers::create_patient))
        .route("/{patient_id}", get(handlers::get_patient).put(handlers::update_patient))
        .route("/{patient_id}/appointments", get(handlers::get_upcoming_appointments))
        .with_state(state)
}
