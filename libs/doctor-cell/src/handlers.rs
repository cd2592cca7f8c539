use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::ClinicStore;
use shared_models::error::AppError;
use shared_utils::Clock;

use crate::models::{DaySlotsResponse, RegisterDoctorRequest, SlotsQuery, UpdateWorkingHoursRequest};
use crate::services::{AvailabilityService, DoctorLocks, DoctorService};

pub struct DoctorCellState {
    pub doctors: DoctorService,
    pub availability: AvailabilityService,
    pub clock: Arc<dyn Clock>,
}

impl DoctorCellState {
    /// `locks` must be the registry the booking path uses.
    pub fn new(
        store: Arc<dyn ClinicStore>,
        clock: Arc<dyn Clock>,
        timeout_ms: u64,
        rules: SchedulingConfig,
        locks: DoctorLocks,
    ) -> Self {
        Self {
            doctors: DoctorService::new(store.clone(), timeout_ms, locks),
            availability: AvailabilityService::new(store, timeout_ms, rules),
            clock,
        }
    }
}

// ==============================================================================
// DOCTOR RECORDS
// ==============================================================================

#[axum::debug_handler]
pub async fn register_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Json(request): Json<RegisterDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.doctors.register(request, state.clock.now()).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn list_doctors(State(state): State<Arc<DoctorCellState>>) -> Result<Json<Value>, AppError> {
    let doctors = state.doctors.list().await?;
    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.doctors.get(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn replace_working_hours(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateWorkingHoursRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor = state
        .doctors
        .replace_working_hours(doctor_id, request, state.clock.now())
        .await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn deactivate_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.doctors.deactivate(doctor_id, state.clock.now()).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn reactivate_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.doctors.reactivate(doctor_id, state.clock.now()).await?;
    Ok(Json(json!(doctor)))
}

// ==============================================================================
// CALENDAR
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<DaySlotsResponse>, AppError> {
    let slots = state
        .availability
        .available_slots(doctor_id, query.date, query.duration_minutes, state.clock.now())
        .await?;

    Ok(Json(DaySlotsResponse {
        doctor_id,
        date: query.date,
        slots,
    }))
}

#[axum::debug_handler]
pub async fn get_doctor_day(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.availability.doctor_day(doctor_id, query.date).await?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "appointments": appointments,
        "total": appointments.len()
    })))
}
