use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, SchedulingEngine};
use doctor_cell::handlers::DoctorCellState;
use doctor_cell::router::doctor_routes;
use patient_cell::{patient_routes, PatientCellState};
use shared_database::{with_timeout, ClinicStore};
use shared_models::error::AppError;

/// Liveness plus a bounded round trip to the clinic store.
async fn health(State(store): State<Arc<dyn ClinicStore>>) -> Result<Json<Value>, AppError> {
    with_timeout(1_000, store.health_check())
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(json!({ "status": "ok", "storage": "reachable" })))
}

pub fn create_router(
    store: Arc<dyn ClinicStore>,
    doctors: Arc<DoctorCellState>,
    patients: Arc<PatientCellState>,
    engine: Arc<SchedulingEngine>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .route("/health", get(health).with_state(store))
        .nest("/doctors", doctor_routes(doctors))
        .nest("/patients", patient_routes(patients))
        .nest("/appointments", appointment_routes(engine))
}
