// libs/intervention-cell/tests/policy_test.rs
//
// Plan construction and the per-appointment follow-up state progression.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use intervention_cell::{ActionKind, InterventionPolicy, InterventionTracker, TrackerState};
use intervention_cell::{DeliveryOutcome, DeliveryReport};
use shared_config::InterventionConfig;
use shared_models::{AppointmentStatus, Channel, RecomputeTrigger, RiskAssessment, RiskTier};
use shared_utils::test_utils::{at, reference_monday};

fn assessment(tier: RiskTier, computed_at: DateTime<Utc>) -> RiskAssessment {
    RiskAssessment {
        id: Uuid::new_v4(),
        appointment_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        score: match tier {
            RiskTier::Low => 0.2,
            RiskTier::Medium => 0.4,
            RiskTier::High => 0.7,
        },
        factors: BTreeMap::new(),
        tier,
        trigger: RecomputeTrigger::Booking,
        computed_at,
    }
}

fn delivered(action: &intervention_cell::InterventionAction, at: DateTime<Utc>) -> DeliveryReport {
    DeliveryReport {
        action_id: action.id,
        appointment_id: action.appointment_id,
        channel: action.channel,
        outcome: DeliveryOutcome::Delivered { provider_reference: None },
        reported_at: at,
    }
}

// ==============================================================================
// PLANS
// ==============================================================================

#[test]
fn low_tier_gets_one_preferred_channel_a_day_ahead() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let plan = policy.plan(
        &assessment(RiskTier::Low, now),
        &[Channel::Email, Channel::Sms],
        Duration::days(5),
    );

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].channel, Channel::Email);
    assert_eq!(plan[0].scheduled_send_time, now + Duration::days(4));
    assert_eq!(plan[0].message_template_key, "reminder.low");
}

#[test]
fn higher_tiers_get_more_channels_and_touches() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let prefs = [Channel::Sms];

    let low = policy.plan(&assessment(RiskTier::Low, now), &prefs, Duration::days(5));
    let medium = policy.plan(&assessment(RiskTier::Medium, now), &prefs, Duration::days(5));
    let high = policy.plan(&assessment(RiskTier::High, now), &prefs, Duration::days(5));

    assert!(low.len() < medium.len());
    assert!(medium.len() < high.len());

    // Medium: SMS then the clinic's next channel (phone), at 48h and 24h.
    let medium_channels: Vec<_> = medium.iter().map(|a| a.channel).collect();
    assert!(medium_channels.contains(&Channel::Phone));
    assert!(high.iter().any(|a| a.kind == ActionKind::ManualConfirmation));
}

#[test]
fn same_day_high_risk_plan_fires_within_hours() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 8, 0);
    let plan = policy.plan(
        &assessment(RiskTier::High, now),
        &[Channel::Sms, Channel::Email],
        Duration::minutes(90),
    );

    let channels: std::collections::HashSet<_> = plan
        .iter()
        .filter(|a| a.kind == ActionKind::Reminder)
        .map(|a| a.channel)
        .collect();
    assert!(channels.len() >= 2);
    assert!(plan.iter().all(|a| a.scheduled_send_time >= now));
    assert!(plan.iter().all(|a| a.scheduled_send_time <= now + Duration::hours(3)));

    // Offsets that fall in the past collapse onto "now" without duplicating sends.
    let mut keys: Vec<_> = plan.iter().map(|a| (a.kind, a.channel, a.scheduled_send_time)).collect();
    let before = keys.len();
    keys.dedup();
    assert_eq!(keys.len(), before);
}

#[test]
fn urgent_window_adds_a_channel() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let prefs = [Channel::Email];

    assert_eq!(policy.channels_for(RiskTier::Low, &prefs, Duration::days(3)), vec![Channel::Email]);
    assert_eq!(
        policy.channels_for(RiskTier::Low, &prefs, Duration::hours(6)),
        vec![Channel::Email, Channel::Sms]
    );
}

#[test]
fn appointments_already_started_get_no_plan() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    assert!(policy
        .plan(&assessment(RiskTier::High, now), &[Channel::Sms], Duration::zero())
        .is_empty());
}

#[test]
fn plans_are_ordered_by_send_time() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let plan = policy.plan(&assessment(RiskTier::High, now), &[Channel::Phone], Duration::days(4));
    assert!(plan
        .windows(2)
        .all(|w| w[0].scheduled_send_time <= w[1].scheduled_send_time));
}

// ==============================================================================
// TRACKER
// ==============================================================================

#[test]
fn tracker_walks_scheduled_sent_acknowledged() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::Low, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::days(2));
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::Low));
    assert_eq!(tracker.state, TrackerState::Scheduled);

    assert!(tracker.take_due(now).is_empty());
    let send_at = now + Duration::days(1);
    let due = tracker.take_due(send_at);
    assert_eq!(due.len(), 1);

    tracker.record_delivery(&delivered(&due[0], send_at));
    assert_eq!(tracker.state, TrackerState::Sent);
    assert_eq!(tracker.unacknowledged_sends, 1);

    assert!(tracker.acknowledge(send_at + Duration::hours(1)));
    assert_eq!(tracker.state, TrackerState::Acknowledged);
    assert!(!tracker.acknowledge(send_at + Duration::hours(2)));
    assert!(tracker.tick(send_at + Duration::days(1), &policy).is_none());
}

#[test]
fn acknowledgement_requires_a_sent_touch() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::Low, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::days(2));
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::Low));

    assert!(!tracker.acknowledge(now));
    assert_eq!(tracker.state, TrackerState::Scheduled);
    assert_eq!(tracker.pending.len(), 1);
    assert!(tracker.acknowledged_at.is_none());

    let mut idle = InterventionTracker::new(&risk, Vec::new(), vec![Channel::Sms], policy.follow_up_window(RiskTier::Low));
    assert_eq!(idle.state, TrackerState::NoAction);
    assert!(!idle.acknowledge(now));
    assert_eq!(idle.state, TrackerState::NoAction);
}

#[test]
fn failed_delivery_does_not_count_as_sent() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::Low, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::hours(30));
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::Low));

    let due = tracker.take_due(now + Duration::hours(6));
    let mut report = delivered(&due[0], now);
    report.outcome = DeliveryOutcome::Failed { reason: "gateway down".to_string() };
    tracker.record_delivery(&report);

    assert_eq!(tracker.state, TrackerState::Scheduled);
    assert_eq!(tracker.failed, vec![due[0].id]);
}

#[test]
fn finalizing_the_appointment_closes_the_tracker() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::Medium, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::days(3));
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::Medium));

    tracker.close(AppointmentStatus::Cancelled);
    assert_eq!(tracker.state, TrackerState::Closed { status: AppointmentStatus::Cancelled });
    assert!(tracker.pending.is_empty());
    assert!(tracker.take_due(now + Duration::days(3)).is_empty());
}

proptest! {
    #[test]
    fn at_most_one_escalation_per_assessment(ticks in proptest::collection::vec(1i64..600, 1..40)) {
        let policy = InterventionPolicy::new(InterventionConfig::default());
        let now = at(reference_monday(), 9, 0);
        let risk = assessment(RiskTier::High, now);
        let plan = policy.plan(&risk, &[Channel::Sms], Duration::hours(6));
        let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::High));

        let mut clock = now;
        for due in tracker.take_due(clock) {
            tracker.record_delivery(&delivered(&due, clock));
        }

        let mut escalations = 0;
        for step in ticks {
            clock += Duration::minutes(step);
            if tracker.tick(clock, &policy).is_some() {
                escalations += 1;
            }
            for due in tracker.take_due(clock) {
                tracker.record_delivery(&delivered(&due, clock));
            }
        }

        prop_assert!(escalations <= 1);
        prop_assert!(tracker.escalation_count() <= 1);
    }
}

#[test]
fn unacknowledged_escalation_exhausts() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::High, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::hours(6));
    let window = policy.follow_up_window(RiskTier::High);
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], window);

    for due in tracker.take_due(now) {
        tracker.record_delivery(&delivered(&due, now));
    }
    let escalation = tracker.tick(now + window, &policy).unwrap();
    assert_eq!(escalation.kind, ActionKind::Escalation);
    assert_eq!(escalation.message_template_key, "escalation.high");
    assert_eq!(tracker.state, TrackerState::Escalated);

    assert!(tracker.tick(now + window * 2, &policy).is_none());
    assert_eq!(tracker.state, TrackerState::EscalatedExhausted);
}

#[test]
fn exhausted_escalation_keeps_planned_reminders() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 9, 0);
    let risk = assessment(RiskTier::High, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::hours(30));
    let window = policy.follow_up_window(RiskTier::High);
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], window);

    for due in tracker.take_due(now) {
        tracker.record_delivery(&delivered(&due, now));
    }
    assert!(tracker.tick(now + window, &policy).is_some());
    assert!(tracker.tick(now + window * 2, &policy).is_none());
    assert_eq!(tracker.state, TrackerState::EscalatedExhausted);

    // The unsent escalation is dropped; the 24h and 2h reminders survive.
    assert!(tracker.pending.iter().all(|a| a.kind != ActionKind::Escalation));
    assert!(!tracker.pending.is_empty());

    let later = tracker.take_due(now + Duration::hours(28));
    assert!(!later.is_empty());
    assert!(later.iter().all(|a| a.kind == ActionKind::Reminder));
    assert!(tracker.pending.is_empty());
    assert!(!tracker.acknowledge(now + Duration::hours(29)));
}

#[test]
fn replan_does_not_repeat_overdue_touches() {
    let policy = InterventionPolicy::new(InterventionConfig::default());
    let now = at(reference_monday(), 8, 0);
    let risk = assessment(RiskTier::High, now);
    let plan = policy.plan(&risk, &[Channel::Sms], Duration::hours(3));
    let mut tracker = InterventionTracker::new(&risk, plan, vec![Channel::Sms], policy.follow_up_window(RiskTier::High));

    let first_wave = tracker.take_due(now);
    assert!(!first_wave.is_empty());

    let later = now + Duration::minutes(10);
    let rescored = assessment(RiskTier::High, later);
    let replan = policy.plan(&rescored, &[Channel::Sms], Duration::hours(3) - Duration::minutes(10));
    tracker.replan(&rescored, replan, policy.follow_up_window(RiskTier::High));

    let repeated = tracker.take_due(later);
    assert!(repeated
        .iter()
        .all(|a| !first_wave.iter().any(|f| f.channel == a.channel && f.kind == a.kind)));
}
