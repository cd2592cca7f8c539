// libs/appointment-cell/tests/engine_test.rs
//
// End-to-end flows through the engine handle: booking, scoring, planning,
// dispatch and the follow-up sweeps.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use appointment_cell::{AppointmentError, BookAppointmentRequest, RescheduleAppointmentRequest, SchedulingEngine};
use intervention_cell::{
    ActionKind, DeliveryResult, DispatchError, InterventionAction, LogDispatcher, NotificationDispatcher, TrackerState,
};
use risk_cell::FlagVerifier;
use shared_database::{ClinicStore, InMemoryStore};
use shared_models::error::ErrorKind;
use shared_models::{AppointmentStatus, AppointmentType, Doctor, Patient, RecomputeTrigger, RiskTier};
use shared_utils::test_utils::{at, reference_monday, TestConfig, TestDoctor, TestPatient};
use shared_utils::{Clock, FixedClock};

// ==============================================================================
// HARNESS
// ==============================================================================

struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn send(&self, _action: &InterventionAction) -> Result<DeliveryResult, DispatchError> {
        Err(DispatchError::Rejected("gateway unavailable".to_string()))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<InterventionAction>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, action: &InterventionAction) -> Result<DeliveryResult, DispatchError> {
        self.sent.lock().unwrap().push(action.clone());
        Ok(DeliveryResult {
            action_id: action.id,
            provider_reference: None,
        })
    }
}

struct Harness {
    engine: SchedulingEngine,
    store: Arc<InMemoryStore>,
    clock: Arc<FixedClock>,
    doctor: Doctor,
}

impl Harness {
    async fn new(doctor: Doctor, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        store.put_doctor(&doctor).await.unwrap();
        let clock = Arc::new(FixedClock::new(at(reference_monday(), 8, 0)));
        let config = TestConfig::default().to_app_config();
        let engine = SchedulingEngine::new(&config, store.clone(), dispatcher, Arc::new(FlagVerifier), clock.clone());
        Self {
            engine,
            store,
            clock,
            doctor,
        }
    }

    async fn with_log_dispatcher() -> Self {
        Self::new(TestDoctor::single_window(), Arc::new(LogDispatcher)).await
    }

    async fn patient(&self, patient: Patient) -> Patient {
        self.store.put_patient(&patient).await.unwrap();
        patient
    }

    fn request(&self, patient: &Patient, start: DateTime<Utc>, minutes: u32) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doctor_id: self.doctor.id,
            patient_id: patient.id,
            start_time: start,
            duration_minutes: minutes,
            appointment_type: AppointmentType::GeneralConsultation,
            notes: None,
            insurance_verified: true,
        }
    }

    /// Waits for `expected` delivery reports and applies them.
    async fn settle(&self, expected: usize) -> usize {
        let mut applied = 0;
        for _ in 0..100 {
            applied += self.engine.drain_delivery_reports().await;
            if applied >= expected {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        applied
    }
}

// ==============================================================================
// SCENARIO
// ==============================================================================

#[tokio::test]
async fn frequent_no_show_booking_same_day_is_high_risk_with_urgent_plan() {
    let h = Harness::with_log_dispatcher().await;
    let day = reference_monday();
    let regular = h.patient(TestPatient::new_patient()).await;
    let risky = h.patient(TestPatient::with_history(1, 3, 0)).await;

    h.engine.book(h.request(&regular, at(day, 9, 0), 15)).await.unwrap();
    let err = h.engine.book(h.request(&risky, at(day, 9, 0), 15)).await.unwrap_err();
    let alternatives: Vec<_> = err.alternatives().iter().map(|s| s.start_time).collect();
    assert_eq!(alternatives, vec![at(day, 9, 15), at(day, 9, 30), at(day, 9, 45)]);

    let outcome = h.engine.book(h.request(&risky, at(day, 9, 15), 15)).await.unwrap();
    let assessment = outcome.assessment.expect("booking is scored");
    assert_eq!(assessment.tier, RiskTier::High);
    assert_eq!(assessment.trigger, RecomputeTrigger::Booking);
    assert!((0.0..=1.0).contains(&assessment.score));

    let now = h.clock.now();
    let channels: HashSet<_> = outcome
        .plan
        .iter()
        .filter(|a| a.kind == ActionKind::Reminder)
        .map(|a| a.channel)
        .collect();
    assert!(channels.len() >= 2);
    assert!(outcome
        .plan
        .iter()
        .all(|a| a.scheduled_send_time >= now && a.scheduled_send_time <= now + Duration::hours(3)));
    assert!(outcome.plan.iter().any(|a| a.kind == ActionKind::ManualConfirmation));
}

#[tokio::test]
async fn new_patient_booked_a_week_ahead_is_low_risk() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let start = at(reference_monday() + Duration::days(7), 9, 0);

    let outcome = h.engine.book(h.request(&patient, start, 15)).await.unwrap();
    let assessment = outcome.assessment.unwrap();
    assert_eq!(assessment.tier, RiskTier::Low);
    assert_eq!(outcome.plan.len(), 1);
    assert_eq!(outcome.plan[0].scheduled_send_time, start - Duration::hours(24));
}

// ==============================================================================
// DISPATCH
// ==============================================================================

#[tokio::test]
async fn failed_dispatch_never_rolls_back_the_booking() {
    let h = Harness::new(TestDoctor::single_window(), Arc::new(FailingDispatcher)).await;
    let patient = h.patient(TestPatient::with_history(1, 3, 0)).await;

    let outcome = h
        .engine
        .book(h.request(&patient, at(reference_monday(), 9, 0), 15))
        .await
        .unwrap();
    let dispatched = outcome.plan.len();
    assert!(dispatched > 0);
    assert_eq!(h.settle(dispatched).await, dispatched);

    let stored = h.store.get_appointment(outcome.appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Requested);

    let tracker = h.engine.tracker(outcome.appointment.id).await.unwrap();
    assert_eq!(tracker.failed.len(), dispatched);
    assert_eq!(tracker.unacknowledged_sends, 0);
    assert_eq!(tracker.state, TrackerState::Scheduled);
}

#[tokio::test]
async fn due_reminders_are_handed_to_the_dispatcher() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let h = Harness::new(TestDoctor::single_window(), dispatcher.clone()).await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let start = at(reference_monday() + Duration::days(7), 9, 0);

    let outcome = h.engine.book(h.request(&patient, start, 15)).await.unwrap();
    assert!(dispatcher.sent.lock().unwrap().is_empty());

    h.clock.set(start - Duration::hours(24));
    assert_eq!(h.engine.dispatch_due(h.clock.now()).await, 1);
    assert_eq!(h.settle(1).await, 1);

    let sent = dispatcher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].appointment_id, outcome.appointment.id);
    assert_eq!(sent[0].message_template_key, "reminder.low");
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn cancel_closes_tracker_and_counts_once() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let start = at(reference_monday() + Duration::days(7), 9, 0);
    let outcome = h.engine.book(h.request(&patient, start, 15)).await.unwrap();
    let id = outcome.appointment.id;

    assert!(h.engine.cancel(id, Some("feeling better")).await.unwrap().changed);
    assert!(!h.engine.cancel(id, None).await.unwrap().changed);

    let tracker = h.engine.tracker(id).await.unwrap();
    assert_eq!(tracker.state, TrackerState::Closed { status: AppointmentStatus::Cancelled });
    let stored = h.store.get_patient(patient.id).await.unwrap().unwrap();
    assert_eq!(stored.history.cancelled, 1);
}

#[tokio::test]
async fn outcomes_feed_patient_history() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let day = reference_monday();
    let attended = h.engine.book(h.request(&patient, at(day, 9, 0), 15)).await.unwrap();
    let missed = h.engine.book(h.request(&patient, at(day, 9, 30), 15)).await.unwrap();

    h.engine.confirm(attended.appointment.id).await.unwrap();
    h.engine.complete(attended.appointment.id).await.unwrap();
    h.engine.mark_no_show(missed.appointment.id).await.unwrap();
    // Repeating a final transition is a no-op, not a second count.
    assert!(!h.engine.mark_no_show(missed.appointment.id).await.unwrap().changed);

    let stored = h.store.get_patient(patient.id).await.unwrap().unwrap();
    assert_eq!(stored.history.completed, 1);
    assert_eq!(stored.history.no_shows, 1);

    assert_matches!(
        h.engine.confirm(missed.appointment.id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );
}

#[tokio::test]
async fn reschedule_replans_the_replacement() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let next_week = reference_monday() + Duration::days(7);
    let original = h.engine.book(h.request(&patient, at(next_week, 9, 0), 15)).await.unwrap();

    let outcome = h
        .engine
        .reschedule(
            original.appointment.id,
            RescheduleAppointmentRequest {
                new_start_time: at(next_week, 9, 45),
                duration_minutes: None,
                reason: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(outcome.booking.appointment.rescheduled_from, Some(original.appointment.id));
    assert!(outcome.booking.assessment.is_some());

    let old_tracker = h.engine.tracker(original.appointment.id).await.unwrap();
    assert!(old_tracker.state.is_terminal());
    let stored = h.store.get_patient(patient.id).await.unwrap().unwrap();
    assert_eq!(stored.history.cancelled, 0);
}

#[tokio::test]
async fn storage_outage_fails_booking_closed() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    h.store.set_available(false).await;

    let err = h
        .engine
        .book(h.request(&patient, at(reference_monday(), 9, 0), 15))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    h.store.set_available(true).await;
    assert_eq!(h.store.appointment_count().await, 0);
}

// ==============================================================================
// REMINDER EVENTS
// ==============================================================================

#[tokio::test]
async fn sends_raise_risk_and_acknowledgement_clears_it() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::with_history(1, 3, 0)).await;
    let outcome = h
        .engine
        .book(h.request(&patient, at(reference_monday(), 9, 30), 15))
        .await
        .unwrap();
    let id = outcome.appointment.id;
    let booked_score = outcome.assessment.unwrap().score;

    let sends = outcome.plan.len();
    assert_eq!(h.settle(sends).await, sends);

    let tracker = h.engine.tracker(id).await.unwrap();
    assert_eq!(tracker.state, TrackerState::Sent);
    assert_eq!(tracker.unacknowledged_sends as usize, sends);

    let after_sends = h.engine.risk().latest(id).await.unwrap().unwrap();
    assert_eq!(after_sends.trigger, RecomputeTrigger::ReminderSent);
    assert!(after_sends.score > booked_score);

    assert!(h.engine.acknowledge(id).await.unwrap());
    assert!(!h.engine.acknowledge(id).await.unwrap());

    let summary = h.engine.risk_summary(id).await.unwrap();
    let latest = summary.latest.unwrap();
    assert_eq!(latest.trigger, RecomputeTrigger::ReminderAcknowledged);
    assert_eq!(latest.factors.get("reminders").copied(), Some(0.0));
    assert_eq!(summary.history.len(), 1 + sends + 1);
    assert_eq!(h.engine.tracker(id).await.unwrap().state, TrackerState::Acknowledged);
}

#[tokio::test]
async fn unanswered_reminders_escalate_once() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::with_history(1, 3, 0)).await;
    let outcome = h
        .engine
        .book(h.request(&patient, at(reference_monday(), 9, 45), 15))
        .await
        .unwrap();
    let id = outcome.appointment.id;
    h.settle(outcome.plan.len()).await;

    assert!(h.engine.process_follow_ups().await.is_empty());

    h.clock.advance(Duration::minutes(120));
    let escalations = h.engine.process_follow_ups().await;
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].kind, ActionKind::Escalation);
    assert_eq!(escalations[0].appointment_id, id);
    h.settle(1).await;

    for _ in 0..3 {
        h.clock.advance(Duration::minutes(90));
        assert!(h.engine.process_follow_ups().await.is_empty());
    }

    let tracker = h.engine.tracker(id).await.unwrap();
    assert_eq!(tracker.escalation_count(), 1);
    assert_eq!(tracker.state, TrackerState::EscalatedExhausted);
}

// ==============================================================================
// SWEEPS AND QUERIES
// ==============================================================================

#[tokio::test]
async fn checkpoints_recompute_once_each() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::new_patient()).await;
    let start = at(reference_monday() + Duration::days(7), 9, 0);
    let id = h.engine.book(h.request(&patient, start, 15)).await.unwrap().appointment.id;

    assert!(h.engine.recompute_due().await.unwrap().is_empty());

    h.clock.set(start - Duration::hours(47));
    let first = h.engine.recompute_due().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].appointment_id, id);
    assert_eq!(first[0].trigger, RecomputeTrigger::Checkpoint { hours_before: 48 });
    assert!(h.engine.recompute_due().await.unwrap().is_empty());

    h.clock.set(start - Duration::hours(23));
    let second = h.engine.recompute_due().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].trigger, RecomputeTrigger::Checkpoint { hours_before: 24 });

    assert_eq!(h.engine.risk().history(id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn high_risk_listing_uses_latest_assessment() {
    let h = Harness::with_log_dispatcher().await;
    let day = reference_monday();
    let risky = h.patient(TestPatient::with_history(0, 4, 0)).await;
    let steady = h.patient(TestPatient::with_history(9, 0, 0)).await;

    let flagged = h.engine.book(h.request(&risky, at(day, 9, 0), 15)).await.unwrap();
    h.engine
        .book(h.request(&steady, at(day + Duration::days(7), 9, 0), 15))
        .await
        .unwrap();

    let listed = h
        .engine
        .high_risk_appointments(at(day, 0, 0), at(day + Duration::days(8), 0, 0))
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|(a, _)| a.id).collect();
    assert_eq!(ids, vec![flagged.appointment.id]);

    let summary = h.engine.risk_summary(flagged.appointment.id).await.unwrap();
    assert!(!summary.recommendations.is_empty());
}

#[tokio::test]
async fn sweep_pass_reports_its_work() {
    let h = Harness::with_log_dispatcher().await;
    let patient = h.patient(TestPatient::with_history(1, 3, 0)).await;
    let outcome = h
        .engine
        .book(h.request(&patient, at(reference_monday(), 9, 0), 15))
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let report = h.engine.run_sweeps().await;
    assert_eq!(report.delivery_reports, outcome.plan.len());
    assert_eq!(report.escalations, 0);
}
