use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentStatus, AppointmentType, Channel, Doctor, Patient, VisitHistory, WorkingWindow,
};

/// Monday used as the reference day throughout the fixtures.
pub fn reference_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap_or_default()
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// UTC instant on `date` at `hour:minute`.
pub fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time(hour, minute)))
}

pub struct TestConfig {
    pub lock_timeout_ms: u64,
    pub storage_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 500,
            storage_timeout_ms: 500,
            dispatch_timeout_ms: 200,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduling.lock_timeout_ms = self.lock_timeout_ms;
        config.storage.timeout_ms = self.storage_timeout_ms;
        config.dispatch.timeout_ms = self.dispatch_timeout_ms;
        config.dispatch.verification_timeout_ms = self.dispatch_timeout_ms;
        config
    }
}

pub struct TestDoctor;

impl TestDoctor {
    pub fn with_windows(windows: Vec<WorkingWindow>, slot_minutes: u32, capacity: u32) -> Doctor {
        let created = at(reference_monday(), 0, 0) - Duration::days(365);
        Doctor {
            id: Uuid::new_v4(),
            display_name: "Dr. Test".to_string(),
            specialty: "General Practice".to_string(),
            working_hours: windows,
            slot_minutes,
            capacity,
            is_active: true,
            created_at: created,
            updated_at: created,
        }
    }

    /// One Monday window 09:00-10:00, 15-minute slots, capacity 1.
    pub fn single_window() -> Doctor {
        Self::with_windows(vec![WorkingWindow::new(Weekday::Mon, time(9, 0), time(10, 0))], 15, 1)
    }

    /// Weekdays 09:00-12:00 and 13:00-17:00, 30-minute slots.
    pub fn weekday_schedule(capacity: u32) -> Doctor {
        let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
        let windows = days
            .iter()
            .flat_map(|day| {
                [
                    WorkingWindow::new(*day, time(9, 0), time(12, 0)),
                    WorkingWindow::new(*day, time(13, 0), time(17, 0)),
                ]
            })
            .collect();
        Self::with_windows(windows, 30, capacity)
    }
}

pub struct TestPatient;

impl TestPatient {
    pub fn with_history(completed: u32, no_shows: u32, cancelled: u32) -> Patient {
        let created = at(reference_monday(), 0, 0) - Duration::days(400);
        Patient {
            id: Uuid::new_v4(),
            first_name: "Test".to_string(),
            last_name: "Patient".to_string(),
            phone: "+15550100".to_string(),
            email: "patient@example.com".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 4, 12),
            channel_preferences: vec![Channel::Sms, Channel::Email],
            history: VisitHistory {
                completed,
                no_shows,
                cancelled,
            },
            created_at: created,
            updated_at: created,
        }
    }

    pub fn new_patient() -> Patient {
        Self::with_history(0, 0, 0)
    }

    pub fn prefers(channels: Vec<Channel>) -> Patient {
        Patient {
            channel_preferences: channels,
            ..Self::new_patient()
        }
    }
}

pub fn appointment(
    doctor: &Doctor,
    patient: &Patient,
    start: DateTime<Utc>,
    duration_minutes: u32,
    status: AppointmentStatus,
    created_at: DateTime<Utc>,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        doctor_id: doctor.id,
        patient_id: patient.id,
        start_time: start,
        duration_minutes,
        status,
        appointment_type: AppointmentType::GeneralConsultation,
        notes: String::new(),
        insurance_verified: true,
        rescheduled_from: None,
        created_at,
        updated_at: created_at,
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn rows<T: serde::Serialize>(items: &[T]) -> serde_json::Value {
        serde_json::to_value(items).unwrap_or_else(|_| json!([]))
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
