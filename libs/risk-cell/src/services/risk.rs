use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::RiskConfig;
use shared_database::{with_timeout, ClinicStore};
use shared_models::{Appointment, Patient, RecomputeTrigger, RiskAssessment, RiskTier};
use shared_utils::run_with_timeout;

use crate::models::{RiskError, RiskSummary, ScoreInputs, SlotHistory, VerificationStatus};
use crate::services::scorer::RiskScorer;
use crate::services::verifier::InsuranceVerifier;

/// Gathers scorer inputs from storage and the verification collaborator,
/// scores, and appends the result to the assessment history.
///
/// Takes no doctor lock: everything it reads is historical or owned by the
/// appointment being scored.
#[derive(Clone)]
pub struct RiskService {
    store: Arc<dyn ClinicStore>,
    scorer: RiskScorer,
    verifier: Arc<dyn InsuranceVerifier>,
    storage_timeout_ms: u64,
    verification_timeout_ms: u64,
}

impl RiskService {
    pub fn new(
        store: Arc<dyn ClinicStore>,
        config: RiskConfig,
        verifier: Arc<dyn InsuranceVerifier>,
        storage_timeout_ms: u64,
        verification_timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            scorer: RiskScorer::new(config),
            verifier,
            storage_timeout_ms,
            verification_timeout_ms,
        }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    #[instrument(skip(self))]
    pub async fn assess(
        &self,
        appointment_id: Uuid,
        as_of: DateTime<Utc>,
        trigger: RecomputeTrigger,
        unacknowledged_reminders: u32,
    ) -> Result<RiskAssessment, RiskError> {
        let appointment = with_timeout(self.storage_timeout_ms, self.store.get_appointment(appointment_id))
            .await?
            .ok_or(RiskError::AppointmentNotFound(appointment_id))?;
        self.assess_appointment(&appointment, as_of, trigger, unacknowledged_reminders)
            .await
    }

    pub async fn assess_appointment(
        &self,
        appointment: &Appointment,
        as_of: DateTime<Utc>,
        trigger: RecomputeTrigger,
        unacknowledged_reminders: u32,
    ) -> Result<RiskAssessment, RiskError> {
        let patient = with_timeout(self.storage_timeout_ms, self.store.get_patient(appointment.patient_id))
            .await?
            .ok_or(RiskError::PatientNotFound(appointment.patient_id))?;

        let lookback = Duration::days(self.scorer.config().slot_history_lookback_days);
        let past = with_timeout(
            self.storage_timeout_ms,
            self.store
                .appointments_for_doctor(appointment.doctor_id, as_of - lookback, as_of),
        )
        .await?;
        let slot_history = SlotHistory::for_slot(
            &past,
            appointment,
            as_of,
            self.scorer.config().slot_history_lookback_days,
        );

        let insurance = self.verification_status(&patient, appointment).await;

        let inputs = ScoreInputs {
            appointment,
            prior_no_shows: patient.history.no_shows,
            prior_total: patient.history.total(),
            slot_history,
            insurance,
            unacknowledged_reminders,
        };
        let assessment = self.scorer.score(&inputs, as_of, trigger);

        with_timeout(self.storage_timeout_ms, self.store.append_assessment(&assessment)).await?;
        debug!(
            "Appointment {} scored {:.3} ({}) on {:?}",
            appointment.id, assessment.score, assessment.tier, trigger
        );
        Ok(assessment)
    }

    /// A failed or slow verification counts as unverified; it never blocks scoring.
    async fn verification_status(&self, patient: &Patient, appointment: &Appointment) -> VerificationStatus {
        match run_with_timeout(self.verification_timeout_ms, self.verifier.verify(patient, appointment)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!("Insurance verification failed for appointment {}: {}", appointment.id, e);
                VerificationStatus::Unknown
            }
            Err(e) => {
                warn!("Insurance verification for appointment {}: {}", appointment.id, e);
                VerificationStatus::Unknown
            }
        }
    }

    pub async fn history(&self, appointment_id: Uuid) -> Result<Vec<RiskAssessment>, RiskError> {
        Ok(with_timeout(
            self.storage_timeout_ms,
            self.store.assessments_for_appointment(appointment_id),
        )
        .await?)
    }

    /// Latest-wins view of the assessment history.
    pub async fn latest(&self, appointment_id: Uuid) -> Result<Option<RiskAssessment>, RiskError> {
        Ok(self
            .history(appointment_id)
            .await?
            .into_iter()
            .max_by_key(|a| a.computed_at))
    }

    pub async fn summary(&self, appointment_id: Uuid) -> Result<RiskSummary, RiskError> {
        let history = self.history(appointment_id).await?;
        let latest = history.iter().max_by_key(|a| a.computed_at).cloned();
        let recommendations = latest
            .as_ref()
            .map(|a| self.scorer.recommendations(a))
            .unwrap_or_default();
        Ok(RiskSummary {
            latest,
            history,
            recommendations,
        })
    }

    /// Active appointments starting in `[from, to)` whose latest assessment is high tier.
    pub async fn high_risk_appointments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(Appointment, RiskAssessment)>, RiskError> {
        let upcoming = with_timeout(self.storage_timeout_ms, self.store.appointments_starting_between(from, to)).await?;

        let mut flagged = Vec::new();
        for appointment in upcoming.into_iter().filter(|a| a.is_active()) {
            if let Some(latest) = self.latest(appointment.id).await? {
                if latest.tier == RiskTier::High {
                    flagged.push((appointment, latest));
                }
            }
        }
        Ok(flagged)
    }
}
