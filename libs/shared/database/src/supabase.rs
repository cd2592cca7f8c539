use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use shared_models::{Appointment, Doctor, Patient, RiskAssessment};

use crate::error::{StorageError, StorageResult};
use crate::store::ClinicStore;

/// Appointments never run longer than a day, so overlap queries only need to
/// look this far back from the range start.
const MAX_APPOINTMENT_SPAN_HOURS: i64 = 24;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: &str, timeout_ms: u64) -> StorageResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(service_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", service_key))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| StorageError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        prefer: Option<&'static str>,
        body: Option<serde_json::Value>,
    ) -> StorageResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut req = self.client.request(method, &url).headers(self.headers.clone());
        if let Some(prefer) = prefer {
            req = req.header("Prefer", prefer);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                502..=504 => StorageError::Unavailable(format!("{}: {}", status, error_text)),
                _ => StorageError::Query(format!("API error ({}): {}", status, error_text)),
            });
        }

        Ok(response)
    }

    pub async fn select<T: DeserializeOwned>(&self, path: &str) -> StorageResult<Vec<T>> {
        let response = self.send(Method::GET, path, None, None).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    /// Inserts or replaces a row keyed by its primary key.
    pub async fn upsert<T: Serialize>(&self, table: &str, row: &T) -> StorageResult<()> {
        let body = serde_json::to_value(row)?;
        self.send(
            Method::POST,
            &format!("/rest/v1/{}", table),
            Some("resolution=merge-duplicates,return=minimal"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    pub async fn insert<T: Serialize>(&self, table: &str, row: &T) -> StorageResult<()> {
        let body = serde_json::to_value(row)?;
        self.send(
            Method::POST,
            &format!("/rest/v1/{}", table),
            Some("return=minimal"),
            Some(body),
        )
        .await?;
        Ok(())
    }
}

fn header_value(raw: &str) -> StorageResult<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|e| StorageError::Configuration(format!("invalid header value: {}", e)))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// [`ClinicStore`] backed by Supabase's PostgREST interface.
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn first<T: DeserializeOwned>(&self, path: &str) -> StorageResult<Option<T>> {
        let rows: Vec<T> = self.client.select(path).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ClinicStore for SupabaseStore {
    async fn get_doctor(&self, id: Uuid) -> StorageResult<Option<Doctor>> {
        self.first(&format!("/rest/v1/doctors?id=eq.{}", id)).await
    }

    async fn put_doctor(&self, doctor: &Doctor) -> StorageResult<()> {
        self.client.upsert("doctors", doctor).await
    }

    async fn list_doctors(&self) -> StorageResult<Vec<Doctor>> {
        self.client.select("/rest/v1/doctors?order=display_name.asc").await
    }

    async fn get_patient(&self, id: Uuid) -> StorageResult<Option<Patient>> {
        self.first(&format!("/rest/v1/patients?id=eq.{}", id)).await
    }

    async fn put_patient(&self, patient: &Patient) -> StorageResult<()> {
        self.client.upsert("patients", patient).await
    }

    async fn get_appointment(&self, id: Uuid) -> StorageResult<Option<Appointment>> {
        self.first(&format!("/rest/v1/appointments?id=eq.{}", id)).await
    }

    async fn put_appointment(&self, appointment: &Appointment) -> StorageResult<()> {
        self.client.upsert("appointments", appointment).await
    }

    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>> {
        let earliest = from
            .checked_sub_signed(chrono::Duration::hours(MAX_APPOINTMENT_SPAN_HOURS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            doctor_id,
            timestamp(earliest),
            timestamp(to)
        );
        let rows: Vec<Appointment> = self.client.select(&path).await?;
        Ok(rows.into_iter().filter(|a| a.overlaps(from, to)).collect())
    }

    async fn appointments_for_patient(&self, patient_id: Uuid) -> StorageResult<Vec<Appointment>> {
        self.client
            .select(&format!(
                "/rest/v1/appointments?patient_id=eq.{}&order=start_time.asc",
                patient_id
            ))
            .await
    }

    async fn appointments_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Appointment>> {
        self.client
            .select(&format!(
                "/rest/v1/appointments?start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
                timestamp(from),
                timestamp(to)
            ))
            .await
    }

    async fn append_assessment(&self, assessment: &RiskAssessment) -> StorageResult<()> {
        self.client.insert("risk_assessments", assessment).await
    }

    async fn assessments_for_appointment(&self, appointment_id: Uuid) -> StorageResult<Vec<RiskAssessment>> {
        self.client
            .select(&format!(
                "/rest/v1/risk_assessments?appointment_id=eq.{}&order=computed_at.asc",
                appointment_id
            ))
            .await
    }

    async fn health_check(&self) -> StorageResult<()> {
        let _: Vec<serde_json::Value> = self.client.select("/rest/v1/doctors?select=id&limit=1").await?;
        Ok(())
    }
}
