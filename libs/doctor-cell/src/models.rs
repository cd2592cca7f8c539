use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StorageError;
use shared_models::error::{AppError, ErrorKind};
use shared_models::WorkingWindow;

// ==============================================================================
// SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
}

/// Why the calendar refuses an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRejection {
    InvalidInterval,
    DoctorInactive,
    OutsideWorkingHours,
    CapacityExceeded,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DaySlotsResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<AvailableSlot>,
}

// ==============================================================================
// DOCTOR MANAGEMENT
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterDoctorRequest {
    pub display_name: String,
    pub specialty: String,
    pub working_hours: Vec<WorkingWindow>,
    pub slot_minutes: u32,
    pub capacity: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkingHoursRequest {
    pub working_hours: Vec<WorkingWindow>,
    pub slot_minutes: Option<u32>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Doctor {0} not found")]
    DoctorNotFound(Uuid),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Timed out after {timeout_ms}ms waiting for doctor {doctor_id}")]
    LockTimeout { doctor_id: Uuid, timeout_ms: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CalendarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalendarError::DoctorNotFound(_) => ErrorKind::NotFound,
            CalendarError::InvalidSchedule(_) | CalendarError::InvalidInterval(_) => ErrorKind::InvalidInterval,
            CalendarError::LockTimeout { .. } => ErrorKind::SlotUnavailable,
            CalendarError::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::DoctorNotFound(_) => AppError::NotFound(err.to_string()),
            CalendarError::InvalidSchedule(msg) | CalendarError::InvalidInterval(msg) => AppError::ValidationError(msg),
            CalendarError::LockTimeout { .. } => AppError::Conflict(err.to_string()),
            CalendarError::Storage(e) => e.into(),
        }
    }
}
