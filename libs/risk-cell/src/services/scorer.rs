use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_config::{LeadTimeDecay, RiskConfig};
use shared_models::{RecomputeTrigger, RiskAssessment, RiskTier};

use crate::models::{
    ScoreInputs, FACTOR_HISTORY, FACTOR_INSURANCE, FACTOR_LEAD_TIME, FACTOR_REMINDERS, FACTOR_SLOT_HISTORY,
};

/// Deterministic weighted-factor no-show model.
///
/// Each factor produces a raw value in `[0, 1]`; its contribution is that
/// value times the configured weight. The score is the clamped sum of
/// contributions. Identical inputs always yield identical assessments apart
/// from the generated id.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn score(&self, inputs: &ScoreInputs<'_>, as_of: DateTime<Utc>, trigger: RecomputeTrigger) -> RiskAssessment {
        let weights = &self.config.weights;
        let raw = [
            (FACTOR_HISTORY, weights.history, self.history_rate(inputs.prior_no_shows, inputs.prior_total)),
            (FACTOR_LEAD_TIME, weights.lead_time, self.lead_time_risk(inputs)),
            (
                FACTOR_SLOT_HISTORY,
                weights.slot_history,
                self.smoothed_rate(inputs.slot_history.no_shows, inputs.slot_history.total),
            ),
            (
                FACTOR_INSURANCE,
                weights.insurance,
                if inputs.insurance.is_verified() { 0.0 } else { 1.0 },
            ),
            (FACTOR_REMINDERS, weights.reminders, self.reminder_risk(inputs.unacknowledged_reminders)),
        ];

        let factors: BTreeMap<String, f64> = raw
            .iter()
            .map(|(name, weight, value)| (name.to_string(), weight * value.clamp(0.0, 1.0)))
            .collect();
        let score = self.clamp(factors.values().sum());

        RiskAssessment {
            id: Uuid::new_v4(),
            appointment_id: inputs.appointment.id,
            patient_id: inputs.appointment.patient_id,
            score,
            factors,
            tier: self.tier_for(score),
            trigger,
            computed_at: as_of,
        }
    }

    pub fn tier_for(&self, score: f64) -> RiskTier {
        if score >= self.config.high_threshold {
            RiskTier::High
        } else if score >= self.config.medium_threshold {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Laplace-smoothed patient no-show rate; new patients sit at the prior.
    pub fn history_rate(&self, no_shows: u32, total: u32) -> f64 {
        self.smoothed_rate(no_shows, total)
    }

    fn smoothed_rate(&self, no_shows: u32, total: u32) -> f64 {
        let alpha = self.config.laplace_alpha;
        let beta = self.config.laplace_beta;
        let no_shows = no_shows.min(total) as f64;
        (no_shows + alpha) / (total as f64 + alpha + beta)
    }

    /// Risk from the gap between booking and appointment: too short or too
    /// long both count.
    fn lead_time_risk(&self, inputs: &ScoreInputs<'_>) -> f64 {
        let lead = inputs.appointment.start_time - inputs.appointment.created_at;
        let lead_hours = lead.num_minutes().max(0) as f64 / 60.0;
        let short_hours = self.config.short_lead_hours as f64;
        let long_hours = (self.config.long_lead_days * 24) as f64;

        match self.config.lead_time_decay {
            LeadTimeDecay::Step => {
                if lead_hours < short_hours || lead_hours > long_hours {
                    1.0
                } else {
                    0.0
                }
            }
            LeadTimeDecay::Linear => {
                if lead_hours < short_hours {
                    1.0 - lead_hours / short_hours
                } else if lead_hours > long_hours {
                    let ramp_hours = (self.config.linear_ramp_days * 24) as f64;
                    ((lead_hours - long_hours) / ramp_hours).min(1.0)
                } else {
                    0.0
                }
            }
        }
    }

    fn reminder_risk(&self, unacknowledged: u32) -> f64 {
        let saturation = self.config.reminder_saturation.max(1) as f64;
        (unacknowledged as f64 / saturation).min(1.0)
    }

    fn clamp(&self, score: f64) -> f64 {
        if !score.is_finite() {
            return self.config.clamp_max;
        }
        score.max(self.config.clamp_min).min(self.config.clamp_max)
    }

    /// Human-readable actions suggested by an assessment's tier and factors.
    pub fn recommendations(&self, assessment: &RiskAssessment) -> Vec<String> {
        let weights = &self.config.weights;
        let raw = |name: &str, weight: f64| -> f64 {
            if weight <= 0.0 {
                return 0.0;
            }
            assessment.factors.get(name).copied().unwrap_or(0.0) / weight
        };

        let mut out: Vec<&str> = Vec::new();
        if assessment.tier == RiskTier::High {
            out.extend([
                "Schedule multiple reminder calls",
                "Send SMS and email reminders",
                "Consider offering appointment rescheduling",
            ]);
        }
        if assessment.tier >= RiskTier::Medium {
            out.push("Send confirmation call 24 hours before");
        }
        if raw(FACTOR_HISTORY, weights.history) >= 0.5 {
            out.extend(["Require deposit or pre-payment", "Schedule during preferred time slots"]);
        }
        if raw(FACTOR_LEAD_TIME, weights.lead_time) > 0.0 {
            out.extend(["Offer alternative time slots", "Send extra reminder for timing"]);
        }
        if raw(FACTOR_INSURANCE, weights.insurance) > 0.0 {
            out.extend(["Verify insurance coverage", "Discuss payment options"]);
        }
        if raw(FACTOR_REMINDERS, weights.reminders) > 0.0 {
            out.push("Follow up on unacknowledged reminders by phone");
        }

        let mut seen = std::collections::HashSet::new();
        out.into_iter()
            .filter(|r| seen.insert(*r))
            .map(str::to_string)
            .collect()
    }
}
