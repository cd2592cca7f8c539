use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub notes: String,
    pub insurance_verified: bool,
    /// Set when this appointment replaced a cancelled one during a reschedule.
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// Half-open overlap test against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Active appointments hold capacity on the doctor's calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Requested | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "general", alias = "consultation")]
    GeneralConsultation,

    #[serde(alias = "initial", alias = "new_patient")]
    InitialConsultation,

    #[serde(alias = "followup")]
    FollowUp,

    #[serde(alias = "emergency")]
    Urgent,

    #[serde(alias = "telehealth", alias = "virtual")]
    Telehealth,

    Procedure,
}

impl Default for AppointmentType {
    fn default() -> Self {
        AppointmentType::GeneralConsultation
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::GeneralConsultation => write!(f, "general_consultation"),
            AppointmentType::InitialConsultation => write!(f, "initial_consultation"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Urgent => write!(f, "urgent"),
            AppointmentType::Telehealth => write!(f, "telehealth"),
            AppointmentType::Procedure => write!(f, "procedure"),
        }
    }
}
