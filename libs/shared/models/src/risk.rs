use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// The event that caused an assessment to be computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecomputeTrigger {
    Booking,
    ReminderSent,
    ReminderAcknowledged,
    Checkpoint { hours_before: i64 },
    Manual,
}

/// A single, immutable no-show risk computation. New computations append a
/// fresh record; the latest by `computed_at` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub score: f64,
    /// Factor name to weighted contribution.
    pub factors: BTreeMap<String, f64>,
    pub tier: RiskTier,
    pub trigger: RecomputeTrigger,
    pub computed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// The factor that contributed most, if any contributed at all.
    pub fn dominant_factor(&self) -> Option<(&str, f64)> {
        self.factors
            .iter()
            .filter(|(_, value)| **value > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, value)| (name.as_str(), *value))
    }
}
