use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::{AppointmentStatus, Channel, RiskAssessment, RiskTier};

use crate::models::{ActionKind, DeliveryReport, InterventionAction, TrackerState};
use crate::services::policy::InterventionPolicy;

/// Intervention progress for one appointment.
///
/// `no_action -> scheduled -> sent -> (acknowledged | escalated)`, with
/// `escalated -> escalated_exhausted` once the escalation's own follow-up
/// window passes. Finalizing the appointment closes the tracker from any
/// state. At most one automatic escalation is ever generated. An exhausted
/// tracker still sends the reminders it had planned.
#[derive(Debug, Clone, Serialize)]
pub struct InterventionTracker {
    pub appointment_id: Uuid,
    pub assessment_id: Uuid,
    pub tier: RiskTier,
    pub state: TrackerState,
    pub preferences: Vec<Channel>,
    pub pending: Vec<InterventionAction>,
    pub dispatched: Vec<InterventionAction>,
    pub failed: Vec<Uuid>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalated_for: Option<Uuid>,
    pub unacknowledged_sends: u32,
    follow_up_window_minutes: i64,
}

impl InterventionTracker {
    pub fn new(
        assessment: &RiskAssessment,
        plan: Vec<InterventionAction>,
        preferences: Vec<Channel>,
        follow_up_window: Duration,
    ) -> Self {
        let state = if plan.is_empty() {
            TrackerState::NoAction
        } else {
            TrackerState::Scheduled
        };
        Self {
            appointment_id: assessment.appointment_id,
            assessment_id: assessment.id,
            tier: assessment.tier,
            state,
            preferences,
            pending: plan,
            dispatched: Vec::new(),
            failed: Vec::new(),
            last_sent_at: None,
            acknowledged_at: None,
            escalated_at: None,
            escalated_for: None,
            unacknowledged_sends: 0,
            follow_up_window_minutes: follow_up_window.num_minutes(),
        }
    }

    fn follow_up_window(&self) -> Duration {
        Duration::minutes(self.follow_up_window_minutes)
    }

    /// Swaps unsent actions for a fresh plan after a recomputation.
    pub fn replan(&mut self, assessment: &RiskAssessment, plan: Vec<InterventionAction>, follow_up_window: Duration) {
        if self.state.is_terminal() {
            return;
        }
        self.assessment_id = assessment.id;
        self.tier = assessment.tier;
        self.follow_up_window_minutes = follow_up_window.num_minutes();

        // Touches already sent, and overdue touches on a channel already used, are not repeated.
        let now = assessment.computed_at;
        let fresh: Vec<InterventionAction> = plan
            .into_iter()
            .filter(|a| {
                !self.dispatched.iter().any(|d| {
                    d.channel == a.channel
                        && d.kind == a.kind
                        && (d.scheduled_send_time == a.scheduled_send_time || a.scheduled_send_time <= now)
                })
            })
            .collect();
        let mut pending: Vec<InterventionAction> = self
            .pending
            .drain(..)
            .filter(|a| a.kind == ActionKind::Escalation)
            .collect();
        pending.extend(fresh);
        self.pending = pending;
        self.pending.sort_by_key(|a| a.scheduled_send_time);

        if self.state == TrackerState::NoAction && !self.pending.is_empty() {
            self.state = TrackerState::Scheduled;
        }
    }

    /// Removes and returns the actions due at `now`.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<InterventionAction> {
        if self.state.is_terminal() && self.state != TrackerState::EscalatedExhausted {
            return Vec::new();
        }
        let (due, later): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|a| a.scheduled_send_time <= now);
        self.pending = later;
        self.dispatched.extend(due.iter().cloned());
        due
    }

    pub fn record_delivery(&mut self, report: &DeliveryReport) {
        if !report.is_delivered() {
            self.failed.push(report.action_id);
            return;
        }
        if self.state.is_terminal() {
            return;
        }
        self.unacknowledged_sends += 1;
        self.last_sent_at = Some(self.last_sent_at.map_or(report.reported_at, |at| at.max(report.reported_at)));
        if matches!(self.state, TrackerState::NoAction | TrackerState::Scheduled) {
            self.state = TrackerState::Sent;
        }
    }

    /// Only a sent or escalated touch can be acknowledged. Returns false
    /// otherwise, including when the tracker had already finished.
    pub fn acknowledge(&mut self, at: DateTime<Utc>) -> bool {
        if !matches!(self.state, TrackerState::Sent | TrackerState::Escalated) {
            debug!("Ignoring acknowledgement for appointment {} in state {:?}", self.appointment_id, self.state);
            return false;
        }
        self.state = TrackerState::Acknowledged;
        self.acknowledged_at = Some(at);
        self.unacknowledged_sends = 0;
        self.pending.clear();
        true
    }

    pub fn close(&mut self, status: AppointmentStatus) {
        if matches!(self.state, TrackerState::Closed { .. }) {
            return;
        }
        self.state = TrackerState::Closed { status };
        self.pending.clear();
    }

    /// Advances follow-up deadlines. Yields the escalation action the first
    /// time a sent touch goes unacknowledged past its window, and nothing ever after.
    pub fn tick(&mut self, now: DateTime<Utc>, policy: &InterventionPolicy) -> Option<InterventionAction> {
        match self.state {
            TrackerState::Sent => {
                let deadline = self.last_sent_at?.checked_add_signed(self.follow_up_window())?;
                if now < deadline || self.escalated_for.is_some() {
                    return None;
                }
                let used: Vec<Channel> = self.dispatched.iter().map(|a| a.channel).collect();
                let escalation = policy.escalation(
                    self.assessment_id,
                    self.appointment_id,
                    self.tier,
                    &used,
                    &self.preferences,
                    now,
                );
                self.state = TrackerState::Escalated;
                self.escalated_at = Some(now);
                self.escalated_for = Some(self.assessment_id);
                self.pending.push(escalation.clone());
                Some(escalation)
            }
            TrackerState::Escalated => {
                let deadline = self.escalated_at?.checked_add_signed(self.follow_up_window())?;
                if now >= deadline {
                    self.state = TrackerState::EscalatedExhausted;
                    let before = self.pending.len();
                    self.pending.retain(|a| a.kind != ActionKind::Escalation);
                    debug!(
                        "Appointment {} escalation exhausted; dropped {} unsent escalations, {} touches remain",
                        self.appointment_id,
                        before - self.pending.len(),
                        self.pending.len()
                    );
                }
                None
            }
            _ => None,
        }
    }

    pub fn escalation_count(&self) -> usize {
        self.dispatched
            .iter()
            .chain(self.pending.iter())
            .filter(|a| a.kind == ActionKind::Escalation)
            .count()
    }
}

/// Shared tracker table, one entry per appointment.
#[derive(Default)]
pub struct InterventionRegistry {
    trackers: RwLock<HashMap<Uuid, InterventionTracker>>,
}

impl InterventionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking, or replans an existing tracker.
    pub async fn install(
        &self,
        assessment: &RiskAssessment,
        plan: Vec<InterventionAction>,
        preferences: Vec<Channel>,
        follow_up_window: Duration,
    ) {
        let mut trackers = self.trackers.write().await;
        match trackers.get_mut(&assessment.appointment_id) {
            Some(tracker) => tracker.replan(assessment, plan, follow_up_window),
            None => {
                trackers.insert(
                    assessment.appointment_id,
                    InterventionTracker::new(assessment, plan, preferences, follow_up_window),
                );
            }
        }
    }

    pub async fn get(&self, appointment_id: Uuid) -> Option<InterventionTracker> {
        self.trackers.read().await.get(&appointment_id).cloned()
    }

    pub async fn unacknowledged_sends(&self, appointment_id: Uuid) -> u32 {
        self.trackers
            .read()
            .await
            .get(&appointment_id)
            .map_or(0, |t| t.unacknowledged_sends)
    }

    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<InterventionAction> {
        let mut trackers = self.trackers.write().await;
        let mut due: Vec<InterventionAction> = trackers.values_mut().flat_map(|t| t.take_due(now)).collect();
        due.sort_by_key(|a| a.scheduled_send_time);
        due
    }

    pub async fn record_delivery(&self, report: &DeliveryReport) {
        let mut trackers = self.trackers.write().await;
        match trackers.get_mut(&report.appointment_id) {
            Some(tracker) => tracker.record_delivery(report),
            None => warn!("Delivery report for untracked appointment {}", report.appointment_id),
        }
    }

    /// None when the appointment has no tracker.
    pub async fn acknowledge(&self, appointment_id: Uuid, at: DateTime<Utc>) -> Option<bool> {
        let mut trackers = self.trackers.write().await;
        let tracker = trackers.get_mut(&appointment_id)?;
        let changed = tracker.acknowledge(at);
        if changed {
            info!("Appointment {} reminders acknowledged", appointment_id);
        }
        Some(changed)
    }

    pub async fn close(&self, appointment_id: Uuid, status: AppointmentStatus) {
        if let Some(tracker) = self.trackers.write().await.get_mut(&appointment_id) {
            tracker.close(status);
            debug!("Intervention tracker for {} closed ({})", appointment_id, status);
        }
    }

    /// Runs follow-up deadlines for every tracker; returns new escalations.
    pub async fn tick_all(&self, now: DateTime<Utc>, policy: &InterventionPolicy) -> Vec<InterventionAction> {
        let mut trackers = self.trackers.write().await;
        trackers
            .values_mut()
            .filter_map(|t| t.tick(now, policy))
            .collect()
    }
}
