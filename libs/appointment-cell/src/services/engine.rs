// libs/appointment-cell/src/services/engine.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::AvailableSlot;
use intervention_cell::{
    DeliveryReport, DispatchService, InterventionAction, InterventionPolicy, InterventionRegistry,
    InterventionTracker, NotificationDispatcher,
};
use patient_cell::PatientService;
use risk_cell::{due_checkpoint, InsuranceVerifier, RiskService, RiskSummary};
use shared_config::AppConfig;
use shared_database::{with_timeout, ClinicStore};
use shared_models::{Appointment, AppointmentStatus, Channel, RecomputeTrigger, RiskAssessment};
use shared_utils::Clock;

use crate::models::{
    AppointmentError, BookAppointmentRequest, BookingOutcome, RescheduleAppointmentRequest, RescheduleOutcome,
    StatusChange, SweepReport,
};
use crate::services::booking::ConflictResolver;
use crate::services::lifecycle::records_outcome;

/// The handle through which every scheduling operation flows.
///
/// Created once at startup and passed explicitly to whoever needs it. Writes
/// to a doctor's calendar are serialized by the resolver's per-doctor locks;
/// risk scoring, planning and dispatch all happen after the lock is released.
pub struct SchedulingEngine {
    store: Arc<dyn ClinicStore>,
    resolver: ConflictResolver,
    patients: PatientService,
    risk: RiskService,
    policy: InterventionPolicy,
    trackers: InterventionRegistry,
    dispatch: DispatchService,
    reports: Mutex<mpsc::UnboundedReceiver<DeliveryReport>>,
    clock: Arc<dyn Clock>,
    checkpoints_hours: Vec<i64>,
    storage_timeout_ms: u64,
}

impl SchedulingEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn ClinicStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        verifier: Arc<dyn InsuranceVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage_timeout_ms = config.storage.timeout_ms;
        let (dispatch, reports) = DispatchService::new(dispatcher, Arc::clone(&clock), config.dispatch.timeout_ms);

        Self {
            resolver: ConflictResolver::new(Arc::clone(&store), config.scheduling.clone(), storage_timeout_ms),
            patients: PatientService::new(
                Arc::clone(&store),
                storage_timeout_ms,
                config.risk.high_risk_no_show_count,
            ),
            risk: RiskService::new(
                Arc::clone(&store),
                config.risk.clone(),
                verifier,
                storage_timeout_ms,
                config.dispatch.verification_timeout_ms,
            ),
            policy: InterventionPolicy::new(config.intervention.clone()),
            trackers: InterventionRegistry::new(),
            dispatch,
            reports: Mutex::new(reports),
            clock,
            checkpoints_hours: config.risk.recompute_checkpoints_hours.clone(),
            storage_timeout_ms,
            store,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn risk(&self) -> &RiskService {
        &self.risk
    }

    // ==============================================================================
    // CALENDAR
    // ==============================================================================

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration_minutes: Option<u32>,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        Ok(self
            .resolver
            .availability()
            .available_slots(doctor_id, date, duration_minutes, self.clock.now())
            .await?)
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<bool, AppointmentError> {
        Ok(self
            .resolver
            .availability()
            .is_available(doctor_id, start, duration_minutes)
            .await?)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.resolver.get(appointment_id).await
    }

    // ==============================================================================
    // BOOKING AND LIFECYCLE
    // ==============================================================================

    /// Books, then scores and plans outside the doctor lock. Only the booking
    /// itself can fail the call.
    #[instrument(skip(self, request))]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<BookingOutcome, AppointmentError> {
        let now = self.clock.now();
        let appointment = self.resolver.book(request, now).await?;
        Ok(self.after_commit(appointment, now).await)
    }

    pub async fn cancel(&self, appointment_id: Uuid, reason: Option<&str>) -> Result<StatusChange, AppointmentError> {
        let now = self.clock.now();
        let change = self.resolver.cancel(appointment_id, reason, now).await?;
        self.finalize(&change, now).await;
        Ok(change)
    }

    pub async fn confirm(&self, appointment_id: Uuid) -> Result<StatusChange, AppointmentError> {
        let now = self.clock.now();
        self.resolver
            .transition(appointment_id, AppointmentStatus::Confirmed, None, now)
            .await
    }

    pub async fn complete(&self, appointment_id: Uuid) -> Result<StatusChange, AppointmentError> {
        let now = self.clock.now();
        let change = self
            .resolver
            .transition(appointment_id, AppointmentStatus::Completed, None, now)
            .await?;
        self.finalize(&change, now).await;
        Ok(change)
    }

    pub async fn mark_no_show(&self, appointment_id: Uuid) -> Result<StatusChange, AppointmentError> {
        let now = self.clock.now();
        let change = self
            .resolver
            .transition(appointment_id, AppointmentStatus::NoShow, None, now)
            .await?;
        self.finalize(&change, now).await;
        Ok(change)
    }

    /// The replaced appointment's reminders stop; the replacement is scored
    /// and planned like a fresh booking. A reschedule is not counted as a
    /// patient cancellation.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<RescheduleOutcome, AppointmentError> {
        let now = self.clock.now();
        let (cancelled, replacement) = self.resolver.reschedule(appointment_id, request, now).await?;
        self.trackers.close(cancelled.id, AppointmentStatus::Cancelled).await;
        let booking = self.after_commit(replacement, now).await;
        Ok(RescheduleOutcome { cancelled, booking })
    }

    async fn after_commit(&self, appointment: Appointment, now: DateTime<Utc>) -> BookingOutcome {
        let outcome = match self.rescore(&appointment, RecomputeTrigger::Booking, now).await {
            Ok((assessment, plan)) => BookingOutcome {
                appointment,
                assessment: Some(assessment),
                plan,
            },
            Err(e) => {
                warn!("Risk pass for appointment {} failed; booking stands: {}", appointment.id, e);
                BookingOutcome {
                    appointment,
                    assessment: None,
                    plan: Vec::new(),
                }
            }
        };
        self.dispatch_due(now).await;
        outcome
    }

    /// Side effects of a committed status change: the tracker closes and the
    /// patient's history is updated. Neither can undo the change itself.
    async fn finalize(&self, change: &StatusChange, now: DateTime<Utc>) {
        if !change.changed {
            return;
        }
        let appointment = &change.appointment;
        if appointment.status.is_terminal() {
            self.trackers.close(appointment.id, appointment.status).await;
        }
        if records_outcome(appointment.status) {
            if let Err(e) = self
                .patients
                .record_outcome(appointment.patient_id, appointment.status, now)
                .await
            {
                warn!(
                    "Could not record {} for patient {}: {}",
                    appointment.status, appointment.patient_id, e
                );
            }
        }
    }

    // ==============================================================================
    // RISK AND INTERVENTIONS
    // ==============================================================================

    /// Appends a fresh assessment and, for an active appointment, replans its
    /// reminders.
    pub async fn score(&self, appointment_id: Uuid, trigger: RecomputeTrigger) -> Result<RiskAssessment, AppointmentError> {
        let now = self.clock.now();
        let appointment = self.resolver.get(appointment_id).await?;
        let (assessment, _) = self.rescore(&appointment, trigger, now).await?;
        Ok(assessment)
    }

    /// Pure planning, no tracker changes.
    pub fn plan(
        &self,
        assessment: &RiskAssessment,
        preferences: &[Channel],
        time_to_appointment: Duration,
    ) -> Vec<InterventionAction> {
        self.policy.plan(assessment, preferences, time_to_appointment)
    }

    async fn rescore(
        &self,
        appointment: &Appointment,
        trigger: RecomputeTrigger,
        now: DateTime<Utc>,
    ) -> Result<(RiskAssessment, Vec<InterventionAction>), AppointmentError> {
        let unacknowledged = self.trackers.unacknowledged_sends(appointment.id).await;
        let assessment = self
            .risk
            .assess_appointment(appointment, now, trigger, unacknowledged)
            .await?;

        if !appointment.is_active() {
            return Ok((assessment, Vec::new()));
        }

        let patient = self.patients.get_patient(appointment.patient_id).await?;
        let plan = self.policy.plan(
            &assessment,
            &patient.channel_preferences,
            appointment.start_time - assessment.computed_at,
        );
        self.trackers
            .install(
                &assessment,
                plan.clone(),
                patient.channel_preferences,
                self.policy.follow_up_window(assessment.tier),
            )
            .await;
        Ok((assessment, plan))
    }

    pub async fn risk_summary(&self, appointment_id: Uuid) -> Result<RiskSummary, AppointmentError> {
        self.resolver.get(appointment_id).await?;
        Ok(self.risk.summary(appointment_id).await?)
    }

    pub async fn high_risk_appointments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(Appointment, RiskAssessment)>, AppointmentError> {
        Ok(self.risk.high_risk_appointments(from, to).await?)
    }

    pub async fn tracker(&self, appointment_id: Uuid) -> Option<InterventionTracker> {
        self.trackers.get(appointment_id).await
    }

    /// Records the patient's acknowledgement. Returns false when there was
    /// nothing outstanding to acknowledge.
    pub async fn acknowledge(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let now = self.clock.now();
        let appointment = self.resolver.get(appointment_id).await?;

        if self.trackers.acknowledge(appointment_id, now).await != Some(true) {
            return Ok(false);
        }
        if let Err(e) = self
            .rescore(&appointment, RecomputeTrigger::ReminderAcknowledged, now)
            .await
        {
            warn!("Rescore after acknowledgement of {} failed: {}", appointment_id, e);
        }
        Ok(true)
    }

    /// Applies one delivery report. A successful send bumps the
    /// unacknowledged count and triggers a recomputation.
    pub async fn record_delivery(&self, report: DeliveryReport) {
        self.trackers.record_delivery(&report).await;
        if !report.is_delivered() {
            return;
        }

        let now = self.clock.now();
        match self.resolver.get(report.appointment_id).await {
            Ok(appointment) if appointment.is_active() => {
                if let Err(e) = self.rescore(&appointment, RecomputeTrigger::ReminderSent, now).await {
                    warn!("Rescore after reminder for {} failed: {}", appointment.id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Delivery report for unknown appointment {}: {}", report.appointment_id, e),
        }
    }

    /// Applies every delivery report received so far without waiting.
    pub async fn drain_delivery_reports(&self) -> usize {
        let mut applied = 0;
        loop {
            let next = self.reports.lock().await.try_recv();
            match next {
                Ok(report) => {
                    self.record_delivery(report).await;
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Hands every due action to the dispatcher and returns immediately.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> usize {
        let due = self.trackers.take_due(now).await;
        let count = due.len();
        if count > 0 {
            debug!("Dispatching {} due actions", count);
            self.dispatch.dispatch(due);
        }
        count
    }

    /// Escalates trackers whose sends went unanswered past their follow-up
    /// window. Each assessment escalates at most once.
    pub async fn process_follow_ups(&self) -> Vec<InterventionAction> {
        let now = self.clock.now();
        let escalations = self.trackers.tick_all(now, &self.policy).await;
        for escalation in &escalations {
            info!(
                "Escalating appointment {} via {}",
                escalation.appointment_id, escalation.channel
            );
        }
        self.dispatch_due(now).await;
        escalations
    }

    /// Recomputes, in parallel, every upcoming appointment that crossed a
    /// checkpoint since its last assessment.
    #[instrument(skip(self))]
    pub async fn recompute_due(&self) -> Result<Vec<RiskAssessment>, AppointmentError> {
        let now = self.clock.now();
        let horizon = self.checkpoints_hours.iter().copied().max().unwrap_or(0);
        if horizon <= 0 {
            return Ok(Vec::new());
        }

        let upcoming = with_timeout(
            self.storage_timeout_ms,
            self.store.appointments_starting_between(now, now + Duration::hours(horizon)),
        )
        .await?;

        let results = join_all(
            upcoming
                .iter()
                .filter(|a| a.is_active())
                .map(|appointment| self.recompute_if_due(appointment, now)),
        )
        .await;

        let mut recomputed = Vec::new();
        for result in results {
            match result {
                Ok(Some(assessment)) => recomputed.push(assessment),
                Ok(None) => {}
                Err(e) => warn!("Checkpoint recomputation failed: {}", e),
            }
        }
        if !recomputed.is_empty() {
            info!("Recomputed risk for {} appointments at checkpoints", recomputed.len());
        }
        Ok(recomputed)
    }

    async fn recompute_if_due(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<Option<RiskAssessment>, AppointmentError> {
        let last = self.risk.latest(appointment.id).await?.map(|a| a.computed_at);
        match due_checkpoint(appointment.start_time, last, now, &self.checkpoints_hours) {
            Some(hours_before) => {
                let (assessment, _) = self
                    .rescore(appointment, RecomputeTrigger::Checkpoint { hours_before }, now)
                    .await?;
                Ok(Some(assessment))
            }
            None => Ok(None),
        }
    }

    /// One pass of every background duty, in dependency order.
    pub async fn run_sweeps(&self) -> SweepReport {
        let delivery_reports = self.drain_delivery_reports().await;
        let escalations = self.process_follow_ups().await.len();
        let recomputed = match self.recompute_due().await {
            Ok(assessments) => assessments.len(),
            Err(e) => {
                warn!("Checkpoint sweep skipped: {}", e);
                0
            }
        };
        let dispatched = self.dispatch_due(self.clock.now()).await;

        SweepReport {
            delivery_reports,
            escalations,
            recomputed,
            dispatched,
        }
    }
}
