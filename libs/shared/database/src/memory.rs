use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{Appointment, Doctor, Patient, RiskAssessment};

use crate::error::{StorageError, StorageResult};
use crate::store::ClinicStore;

/// In-memory store for local development and tests.
///
/// Outages and slow backends can be simulated with [`InMemoryStore::set_available`]
/// and [`InMemoryStore::set_latency`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

#[derive(Default)]
struct MemoryData {
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    appointments: HashMap<Uuid, Appointment>,
    assessments: HashMap<Uuid, Vec<RiskAssessment>>,
    unavailable: bool,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_available(&self, available: bool) {
        self.data.write().await.unavailable = !available;
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.data.write().await.latency = latency;
    }

    pub async fn appointment_count(&self) -> usize {
        self.data.read().await.appointments.len()
    }

    async fn gate(&self) -> StorageResult<()> {
        let (unavailable, latency) = {
            let data = self.data.read().await;
            (data.unavailable, data.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(StorageError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

fn sorted_by_start(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|a| (a.start_time, a.created_at));
    appointments
}

#[async_trait]
impl ClinicStore for InMemoryStore {
    async fn get_doctor(&self, id: Uuid) -> StorageResult<Option<Doctor>> {
        self.gate().await?;
        Ok(self.data.read().await.doctors.get(&id).cloned())
    }

    async fn put_doctor(&self, doctor: &Doctor) -> StorageResult<()> {
        self.gate().await?;
        self.data.write().await.doctors.insert(doctor.id, doctor.clone());
        Ok(())
    }

    async fn list_doctors(&self) -> StorageResult<Vec<Doctor>> {
        self.gate().await?;
        let mut doctors: Vec<Doctor> = self.data.read().await.doctors.values().cloned().collect();
        doctors.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(doctors)
    }

    async fn get_patient(&self, id: Uuid) -> StorageResult<Option<Patient>> {
        self.gate().await?;
        Ok(self.data.read().await.patients.get(&id).cloned())
    }

    async fn put_patient(&self, patient: &Patient) -> StorageResult<()> {
        self.gate().await?;
        self.data.write().await.patients.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> StorageResult<Option<Appointment>> {
        self.gate().await?;
        Ok(self.data.read().await.appointments.get(&id).cloned())
    }

    async fn put_appointment(&self, appointment: &Appointment) -> StorageResult<()> {
        self.gate().await?;
        self.data
            .write()
            .await
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>> {
        self.gate().await?;
        let data = self.data.read().await;
        let matching = data
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.overlaps(from, to))
            .cloned()
            .collect();
        Ok(sorted_by_start(matching))
    }

    async fn appointments_for_patient(&self, patient_id: Uuid) -> StorageResult<Vec<Appointment>> {
        self.gate().await?;
        let data = self.data.read().await;
        let matching = data
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        Ok(sorted_by_start(matching))
    }

    async fn appointments_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>> {
        self.gate().await?;
        let data = self.data.read().await;
        let matching = data
            .appointments
            .values()
            .filter(|a| a.start_time >= from && a.start_time < to)
            .cloned()
            .collect();
        Ok(sorted_by_start(matching))
    }

    async fn append_assessment(&self, assessment: &RiskAssessment) -> StorageResult<()> {
        self.gate().await?;
        let mut data = self.data.write().await;
        let history = data.assessments.entry(assessment.appointment_id).or_default();
        history.push(assessment.clone());
        history.sort_by_key(|a| a.computed_at);
        Ok(())
    }

    async fn assessments_for_appointment(&self, appointment_id: Uuid) -> StorageResult<Vec<RiskAssessment>> {
        self.gate().await?;
        Ok(self
            .data
            .read()
            .await
            .assessments
            .get(&appointment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.gate().await
    }
}
