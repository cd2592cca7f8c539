use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StorageError;
use shared_models::error::{AppError, ErrorKind};
use shared_models::{Appointment, AppointmentStatus, RiskAssessment};

pub const FACTOR_HISTORY: &str = "history";
pub const FACTOR_LEAD_TIME: &str = "lead_time";
pub const FACTOR_SLOT_HISTORY: &str = "slot_history";
pub const FACTOR_INSURANCE: &str = "insurance";
pub const FACTOR_REMINDERS: &str = "reminders";

/// Outcome reported by the external insurance verification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Pending,
    Expired,
    Invalid,
    /// Verification could not be obtained in time.
    Unknown,
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationStatus::Verified)
    }
}

/// No-show record of one weekly time slot (same doctor, weekday and hour).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotHistory {
    pub no_shows: u32,
    pub total: u32,
}

impl SlotHistory {
    /// Counts finalized appointments matching `target`'s weekday and start hour
    /// that started inside `[as_of - lookback, as_of)`.
    pub fn for_slot(past: &[Appointment], target: &Appointment, as_of: DateTime<Utc>, lookback_days: i64) -> Self {
        let since = as_of - Duration::days(lookback_days);
        let weekday = target.start_time.weekday();
        let hour = target.start_time.hour();

        past.iter()
            .filter(|a| a.id != target.id && a.doctor_id == target.doctor_id)
            .filter(|a| a.start_time >= since && a.start_time < as_of)
            .filter(|a| a.start_time.weekday() == weekday && a.start_time.hour() == hour)
            .fold(SlotHistory::default(), |mut acc, a| {
                match a.status {
                    AppointmentStatus::NoShow => {
                        acc.no_shows += 1;
                        acc.total += 1;
                    }
                    AppointmentStatus::Completed => acc.total += 1,
                    _ => {}
                }
                acc
            })
    }
}

/// Everything the scorer looks at for one computation.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub appointment: &'a Appointment,
    pub prior_no_shows: u32,
    pub prior_total: u32,
    pub slot_history: SlotHistory,
    pub insurance: VerificationStatus,
    pub unacknowledged_reminders: u32,
}

#[derive(Debug, Serialize)]
pub struct RiskSummary {
    pub latest: Option<RiskAssessment>,
    pub history: Vec<RiskAssessment>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Patient {0} not found")]
    PatientNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RiskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiskError::AppointmentNotFound(_) | RiskError::PatientNotFound(_) => ErrorKind::NotFound,
            RiskError::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }
}

impl From<RiskError> for AppError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::AppointmentNotFound(_) | RiskError::PatientNotFound(_) => AppError::NotFound(err.to_string()),
            RiskError::Storage(e) => e.into(),
        }
    }
}
