use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::{Appointment, Doctor, Patient, RiskAssessment};

use crate::error::{StorageError, StorageResult};

/// Persistence seam for the scheduling engine.
///
/// Every operation may fail with [`StorageError`]; callers decide whether a
/// failure is fatal. Range queries use half-open `[from, to)` overlap
/// semantics on the appointment interval and return every status, so callers
/// filter by status themselves.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn get_doctor(&self, id: Uuid) -> StorageResult<Option<Doctor>>;
    async fn put_doctor(&self, doctor: &Doctor) -> StorageResult<()>;
    async fn list_doctors(&self) -> StorageResult<Vec<Doctor>>;

    async fn get_patient(&self, id: Uuid) -> StorageResult<Option<Patient>>;
    async fn put_patient(&self, patient: &Patient) -> StorageResult<()>;

    async fn get_appointment(&self, id: Uuid) -> StorageResult<Option<Appointment>>;
    async fn put_appointment(&self, appointment: &Appointment) -> StorageResult<()>;

    /// Appointments of one doctor overlapping `[from, to)`, ordered by start.
    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>>;

    /// All appointments of one patient, ordered by start.
    async fn appointments_for_patient(&self, patient_id: Uuid) -> StorageResult<Vec<Appointment>>;

    /// Appointments of every doctor starting inside `[from, to)`, ordered by start.
    async fn appointments_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>>;

    async fn append_assessment(&self, assessment: &RiskAssessment) -> StorageResult<()>;

    /// Assessment history of one appointment, oldest first.
    async fn assessments_for_appointment(&self, appointment_id: Uuid) -> StorageResult<Vec<RiskAssessment>>;

    async fn health_check(&self) -> StorageResult<()>;
}

/// Bounds a storage call; an elapsed deadline surfaces as [`StorageError::Timeout`].
pub async fn with_timeout<T, F>(timeout_ms: u64, operation: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), operation).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(timeout_ms)),
    }
}
