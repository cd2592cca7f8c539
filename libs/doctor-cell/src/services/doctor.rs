use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_database::{with_timeout, ClinicStore};
use shared_models::Doctor;

use crate::models::{CalendarError, RegisterDoctorRequest, UpdateWorkingHoursRequest};
use crate::services::locks::DoctorLocks;

/// Clinic setup operations on doctor records. Doctors are never deleted,
/// only deactivated.
///
/// Edits to an existing doctor take that doctor's calendar lock, so they
/// never interleave with a booking's recheck-and-commit.
#[derive(Clone)]
pub struct DoctorService {
    store: Arc<dyn ClinicStore>,
    timeout_ms: u64,
    locks: DoctorLocks,
}

impl DoctorService {
    pub fn new(store: Arc<dyn ClinicStore>, timeout_ms: u64, locks: DoctorLocks) -> Self {
        Self {
            store,
            timeout_ms,
            locks,
        }
    }

    #[instrument(skip(self, request), fields(name = %request.display_name))]
    pub async fn register(&self, request: RegisterDoctorRequest, now: DateTime<Utc>) -> Result<Doctor, CalendarError> {
        if request.display_name.trim().is_empty() {
            return Err(CalendarError::InvalidSchedule("display name is required".to_string()));
        }

        let doctor = Doctor {
            id: Uuid::new_v4(),
            display_name: request.display_name.trim().to_string(),
            specialty: request.specialty,
            working_hours: request.working_hours,
            slot_minutes: request.slot_minutes,
            capacity: request.capacity.unwrap_or(1),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        validate(&doctor)?;

        with_timeout(self.timeout_ms, self.store.put_doctor(&doctor)).await?;
        info!("Registered doctor {} ({})", doctor.id, doctor.display_name);
        Ok(doctor)
    }

    pub async fn get(&self, doctor_id: Uuid) -> Result<Doctor, CalendarError> {
        with_timeout(self.timeout_ms, self.store.get_doctor(doctor_id))
            .await?
            .ok_or(CalendarError::DoctorNotFound(doctor_id))
    }

    pub async fn list(&self) -> Result<Vec<Doctor>, CalendarError> {
        Ok(with_timeout(self.timeout_ms, self.store.list_doctors()).await?)
    }

    /// Swaps the weekly schedule. Existing appointments are left untouched
    /// even if they now fall outside working hours.
    #[instrument(skip(self, request))]
    pub async fn replace_working_hours(
        &self,
        doctor_id: Uuid,
        request: UpdateWorkingHoursRequest,
        now: DateTime<Utc>,
    ) -> Result<Doctor, CalendarError> {
        self.get(doctor_id).await?;
        let _guard = self.locks.acquire(doctor_id).await?;

        let mut doctor = self.get(doctor_id).await?;
        doctor.working_hours = request.working_hours;
        if let Some(slot_minutes) = request.slot_minutes {
            doctor.slot_minutes = slot_minutes;
        }
        if let Some(capacity) = request.capacity {
            doctor.capacity = capacity;
        }
        doctor.updated_at = now;
        validate(&doctor)?;

        with_timeout(self.timeout_ms, self.store.put_doctor(&doctor)).await?;
        debug!("Doctor {} now has {} working windows", doctor_id, doctor.working_hours.len());
        Ok(doctor)
    }

    pub async fn deactivate(&self, doctor_id: Uuid, now: DateTime<Utc>) -> Result<Doctor, CalendarError> {
        self.set_active(doctor_id, false, now).await
    }

    pub async fn reactivate(&self, doctor_id: Uuid, now: DateTime<Utc>) -> Result<Doctor, CalendarError> {
        self.set_active(doctor_id, true, now).await
    }

    async fn set_active(&self, doctor_id: Uuid, active: bool, now: DateTime<Utc>) -> Result<Doctor, CalendarError> {
        let current = self.get(doctor_id).await?;
        if current.is_active == active {
            return Ok(current);
        }

        let _guard = self.locks.acquire(doctor_id).await?;
        let mut doctor = self.get(doctor_id).await?;
        if doctor.is_active == active {
            return Ok(doctor);
        }
        doctor.is_active = active;
        doctor.updated_at = now;
        with_timeout(self.timeout_ms, self.store.put_doctor(&doctor)).await?;
        info!("Doctor {} active={}", doctor_id, active);
        Ok(doctor)
    }
}

fn validate(doctor: &Doctor) -> Result<(), CalendarError> {
    doctor
        .validate_schedule()
        .map_err(|issues| CalendarError::InvalidSchedule(issues.join("; ")))
}
