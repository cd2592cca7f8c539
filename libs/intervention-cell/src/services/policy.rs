use chrono::Duration;
use uuid::Uuid;

use shared_config::{InterventionConfig, TierPolicy};
use shared_models::{Channel, RiskAssessment, RiskTier};

use crate::models::{ActionKind, InterventionAction};

/// Pure mapping from a risk assessment to an action plan.
#[derive(Debug, Clone)]
pub struct InterventionPolicy {
    config: InterventionConfig,
    escalation_order: Vec<Channel>,
}

impl InterventionPolicy {
    pub fn new(config: InterventionConfig) -> Self {
        let escalation_order = dedup(config.escalation_order.iter().filter_map(|name| name.parse().ok()));
        Self {
            config,
            escalation_order,
        }
    }

    pub fn tier_policy(&self, tier: RiskTier) -> &TierPolicy {
        match tier {
            RiskTier::Low => &self.config.low,
            RiskTier::Medium => &self.config.medium,
            RiskTier::High => &self.config.high,
        }
    }

    pub fn follow_up_window(&self, tier: RiskTier) -> Duration {
        Duration::minutes(self.tier_policy(tier).follow_up_window_minutes)
    }

    /// Channels for a plan: the patient's preferences first, then the clinic's
    /// escalation order, cut to the tier's channel count. Short notice adds one.
    pub fn channels_for(&self, tier: RiskTier, preferences: &[Channel], time_to_appointment: Duration) -> Vec<Channel> {
        let mut count = self.tier_policy(tier).channel_count.max(1);
        if time_to_appointment < Duration::hours(self.config.urgent_window_hours) {
            count += 1;
        }
        self.ranked_channels(preferences).into_iter().take(count).collect()
    }

    /// Every known channel, preferred ones first.
    pub fn ranked_channels(&self, preferences: &[Channel]) -> Vec<Channel> {
        dedup(
            preferences
                .iter()
                .copied()
                .chain(self.escalation_order.iter().copied())
                .chain(Channel::ALL),
        )
    }

    /// Builds the plan. Touches that would fall before `computed_at` are
    /// pulled forward to it; an appointment already under way gets no plan.
    pub fn plan(
        &self,
        assessment: &RiskAssessment,
        preferences: &[Channel],
        time_to_appointment: Duration,
    ) -> Vec<InterventionAction> {
        if time_to_appointment <= Duration::zero() {
            return Vec::new();
        }

        let now = assessment.computed_at;
        let start = now + time_to_appointment;
        let policy = self.tier_policy(assessment.tier);
        let channels = self.channels_for(assessment.tier, preferences, time_to_appointment);

        let mut actions: Vec<InterventionAction> = Vec::new();
        for offset in &policy.touch_offsets_hours {
            let send_at = start
                .checked_sub_signed(Duration::hours(*offset))
                .map_or(now, |t| t.max(now));
            for channel in &channels {
                let duplicate = actions
                    .iter()
                    .any(|a| a.channel == *channel && a.scheduled_send_time == send_at);
                if !duplicate {
                    actions.push(self.action(assessment, ActionKind::Reminder, *channel, send_at));
                }
            }
        }

        if policy.manual_confirmation {
            actions.push(self.action(assessment, ActionKind::ManualConfirmation, Channel::Phone, now));
        }

        actions.sort_by_key(|a| (a.scheduled_send_time, a.kind, channel_rank(&channels, a.channel)));
        actions
    }

    /// The single automatic escalation for an unacknowledged plan: the best
    /// ranked channel the plan did not already use, or phone.
    pub fn escalation(
        &self,
        assessment_id: Uuid,
        appointment_id: Uuid,
        tier: RiskTier,
        used: &[Channel],
        preferences: &[Channel],
        at: chrono::DateTime<chrono::Utc>,
    ) -> InterventionAction {
        let channel = self
            .ranked_channels(preferences)
            .into_iter()
            .find(|c| !used.contains(c))
            .unwrap_or(Channel::Phone);

        InterventionAction {
            id: Uuid::new_v4(),
            appointment_id,
            assessment_id,
            kind: ActionKind::Escalation,
            channel,
            scheduled_send_time: at,
            message_template_key: format!("{}.{}", ActionKind::Escalation, tier),
        }
    }

    fn action(
        &self,
        assessment: &RiskAssessment,
        kind: ActionKind,
        channel: Channel,
        at: chrono::DateTime<chrono::Utc>,
    ) -> InterventionAction {
        InterventionAction {
            id: Uuid::new_v4(),
            appointment_id: assessment.appointment_id,
            assessment_id: assessment.id,
            kind,
            channel,
            scheduled_send_time: at,
            message_template_key: format!("{}.{}", kind, assessment.tier),
        }
    }
}

fn dedup(channels: impl Iterator<Item = Channel>) -> Vec<Channel> {
    let mut out = Vec::new();
    for channel in channels {
        if !out.contains(&channel) {
            out.push(channel);
        }
    }
    out
}

fn channel_rank(channels: &[Channel], channel: Channel) -> usize {
    channels.iter().position(|c| *c == channel).unwrap_or(channels.len())
}
