use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::ClinicStore;
use shared_models::error::AppError;
use shared_utils::Clock;

use crate::models::{CreatePatientRequest, UpdatePatientRequest};
use crate::services::PatientService;

pub struct PatientCellState {
    pub patients: PatientService,
    pub clock: Arc<dyn Clock>,
}

impl PatientCellState {
    pub fn new(store: Arc<dyn ClinicStore>, clock: Arc<dyn Clock>, timeout_ms: u64, high_risk_no_show_count: u32) -> Self {
        Self {
            patients: PatientService::new(store, timeout_ms, high_risk_no_show_count),
            clock,
        }
    }
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<Arc<PatientCellState>>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state.patients.create_patient(request, state.clock.now()).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<PatientCellState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let patient = state.patients.get_patient(patient_id).await?;
    let high_risk = state.patients.is_high_risk(&patient);
    Ok(Json(json!({
        "patient": patient,
        "high_risk": high_risk
    })))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<Arc<PatientCellState>>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let patient = state
        .patients
        .update_patient(patient_id, request, state.clock.now())
        .await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<PatientCellState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .patients
        .upcoming_appointments(patient_id, state.clock.now())
        .await?;
    Ok(Json(json!({
        "patient_id": patient_id,
        "appointments": appointments,
        "total": appointments.len()
    })))
}
