// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::{AvailableSlot, CalendarError};
use intervention_cell::InterventionAction;
use patient_cell::PatientError;
use risk_cell::RiskError;
use shared_database::StorageError;
use shared_models::error::{AppError, ErrorKind};
use shared_models::{Appointment, AppointmentStatus, AppointmentType, RiskAssessment};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub insurance_verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    /// Keeps the original duration when absent.
    pub duration_minutes: Option<u32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RiskWindowQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// Result of a successful booking: the committed appointment plus whatever
/// the post-commit risk pass produced. A failed risk pass leaves `assessment`
/// empty; the booking stands.
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub assessment: Option<RiskAssessment>,
    pub plan: Vec<InterventionAction>,
}

/// A status change request that may have been a no-op.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub appointment: Appointment,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleOutcome {
    pub cancelled: Appointment,
    pub booking: BookingOutcome,
}

/// Counters from one pass of the background sweeps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub delivery_reports: usize,
    pub escalations: usize,
    pub recomputed: usize,
    pub dispatched: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Doctor {0} not found")]
    DoctorNotFound(Uuid),

    #[error("Patient {0} not found")]
    PatientNotFound(Uuid),

    #[error("Doctor {0} is not accepting appointments")]
    DoctorInactive(Uuid),

    #[error("Requested time is outside the doctor's working hours")]
    SlotOutsideWorkingHours { alternatives: Vec<AvailableSlot> },

    #[error("Doctor is fully booked at the requested time")]
    CapacityExceeded { alternatives: Vec<AvailableSlot> },

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Timed out after {timeout_ms}ms waiting for doctor {doctor_id}'s calendar")]
    LockTimeout { doctor_id: Uuid, timeout_ms: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppointmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::AppointmentNotFound(_)
            | AppointmentError::DoctorNotFound(_)
            | AppointmentError::PatientNotFound(_) => ErrorKind::NotFound,
            AppointmentError::DoctorInactive(_)
            | AppointmentError::SlotOutsideWorkingHours { .. }
            | AppointmentError::CapacityExceeded { .. }
            | AppointmentError::LockTimeout { .. } => ErrorKind::SlotUnavailable,
            AppointmentError::InvalidInterval(_) => ErrorKind::InvalidInterval,
            AppointmentError::InvalidStatusTransition { .. } => ErrorKind::InvalidTransition,
            AppointmentError::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// Suggested replacement slots, nearest first. Empty for every error that
    /// is not a slot conflict.
    pub fn alternatives(&self) -> &[AvailableSlot] {
        match self {
            AppointmentError::SlotOutsideWorkingHours { alternatives }
            | AppointmentError::CapacityExceeded { alternatives } => alternatives,
            _ => &[],
        }
    }
}

impl From<CalendarError> for AppointmentError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::DoctorNotFound(id) => AppointmentError::DoctorNotFound(id),
            CalendarError::InvalidSchedule(msg) | CalendarError::InvalidInterval(msg) => {
                AppointmentError::InvalidInterval(msg)
            }
            CalendarError::LockTimeout { doctor_id, timeout_ms } => {
                AppointmentError::LockTimeout { doctor_id, timeout_ms }
            }
            CalendarError::Storage(e) => AppointmentError::Storage(e),
        }
    }
}

impl From<RiskError> for AppointmentError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::AppointmentNotFound(id) => AppointmentError::AppointmentNotFound(id),
            RiskError::PatientNotFound(id) => AppointmentError::PatientNotFound(id),
            RiskError::Storage(e) => AppointmentError::Storage(e),
        }
    }
}

impl From<PatientError> for AppointmentError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(id) => AppointmentError::PatientNotFound(id),
            PatientError::ValidationError(msg) => AppointmentError::InvalidInterval(msg),
            PatientError::Storage(e) => AppointmentError::Storage(e),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::AppointmentNotFound(_)
            | AppointmentError::DoctorNotFound(_)
            | AppointmentError::PatientNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::SlotOutsideWorkingHours { .. } | AppointmentError::CapacityExceeded { .. } => {
                AppError::SlotUnavailable {
                    message: err.to_string(),
                    alternatives: json!(err.alternatives()),
                }
            }
            AppointmentError::DoctorInactive(_) | AppointmentError::LockTimeout { .. } => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::InvalidInterval(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::Storage(e) => e.into(),
        }
    }
}
