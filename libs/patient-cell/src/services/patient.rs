use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{with_timeout, ClinicStore};
use shared_models::{Appointment, AppointmentStatus, Channel, Patient, VisitHistory};

use crate::models::{CreatePatientRequest, PatientError, UpdatePatientRequest};

#[derive(Clone)]
pub struct PatientService {
    store: Arc<dyn ClinicStore>,
    timeout_ms: u64,
    high_risk_no_show_count: u32,
}

impl PatientService {
    pub fn new(store: Arc<dyn ClinicStore>, timeout_ms: u64, high_risk_no_show_count: u32) -> Self {
        Self {
            store,
            timeout_ms,
            high_risk_no_show_count,
        }
    }

    pub async fn create_patient(&self, request: CreatePatientRequest, now: DateTime<Utc>) -> Result<Patient, PatientError> {
        debug!("Creating new patient profile for: {}", request.email);

        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(PatientError::ValidationError("first and last name are required".to_string()));
        }
        if request.phone.trim().is_empty() && request.email.trim().is_empty() {
            return Err(PatientError::ValidationError("a phone number or email is required".to_string()));
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: request.phone,
            email: request.email,
            date_of_birth: request.date_of_birth,
            channel_preferences: dedup_channels(request.channel_preferences),
            history: VisitHistory::default(),
            created_at: now,
            updated_at: now,
        };

        with_timeout(self.timeout_ms, self.store.put_patient(&patient)).await?;
        info!("Patient created with ID: {}", patient.id);
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        with_timeout(self.timeout_ms, self.store.get_patient(patient_id))
            .await?
            .ok_or(PatientError::NotFound(patient_id))
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        now: DateTime<Utc>,
    ) -> Result<Patient, PatientError> {
        let mut patient = self.get_patient(patient_id).await?;

        if let Some(first_name) = request.first_name {
            patient.first_name = first_name;
        }
        if let Some(last_name) = request.last_name {
            patient.last_name = last_name;
        }
        if let Some(phone) = request.phone {
            patient.phone = phone;
        }
        if let Some(email) = request.email {
            patient.email = email;
        }
        if let Some(preferences) = request.channel_preferences {
            patient.channel_preferences = dedup_channels(preferences);
        }
        patient.updated_at = now;

        with_timeout(self.timeout_ms, self.store.put_patient(&patient)).await?;
        Ok(patient)
    }

    /// Adds a finalized appointment outcome to the patient's history.
    pub async fn record_outcome(
        &self,
        patient_id: Uuid,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Patient, PatientError> {
        let mut patient = self.get_patient(patient_id).await?;
        patient.history.record(status);
        patient.updated_at = now;
        with_timeout(self.timeout_ms, self.store.put_patient(&patient)).await?;

        if status == AppointmentStatus::NoShow && patient.is_high_risk(self.high_risk_no_show_count) {
            warn!(
                "Patient {} reached {} no-shows and is now high risk",
                patient_id, patient.history.no_shows
            );
        }
        Ok(patient)
    }

    /// Active appointments starting at or after `now`, soonest first.
    pub async fn upcoming_appointments(&self, patient_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Appointment>, PatientError> {
        self.get_patient(patient_id).await?;
        let appointments = with_timeout(self.timeout_ms, self.store.appointments_for_patient(patient_id)).await?;
        Ok(appointments
            .into_iter()
            .filter(|a| a.is_active() && a.start_time >= now)
            .collect())
    }

    pub fn is_high_risk(&self, patient: &Patient) -> bool {
        patient.is_high_risk(self.high_risk_no_show_count)
    }
}

fn dedup_channels(channels: Vec<Channel>) -> Vec<Channel> {
    let mut out = Vec::with_capacity(channels.len());
    for channel in channels {
        if !out.contains(&channel) {
            out.push(channel);
        }
    }
    out
}
