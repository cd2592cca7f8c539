use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::{AppError, ErrorKind};
use shared_models::{AppointmentStatus, Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reminder,
    ManualConfirmation,
    Escalation,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Reminder => write!(f, "reminder"),
            ActionKind::ManualConfirmation => write!(f, "manual_confirmation"),
            ActionKind::Escalation => write!(f, "escalation"),
        }
    }
}

/// One planned outbound touch. Planning never sends anything; dispatch is a
/// separate step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionAction {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub assessment_id: Uuid,
    pub kind: ActionKind,
    pub channel: Channel,
    pub scheduled_send_time: DateTime<Utc>,
    /// `{kind}.{tier}`, e.g. `reminder.high`.
    pub message_template_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TrackerState {
    NoAction,
    Scheduled,
    Sent,
    Acknowledged,
    Escalated,
    EscalatedExhausted,
    /// The appointment itself was finalized.
    Closed { status: AppointmentStatus },
}

impl TrackerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackerState::Acknowledged | TrackerState::EscalatedExhausted | TrackerState::Closed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub action_id: Uuid,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DeliveryOutcome {
    Delivered { provider_reference: Option<String> },
    Failed { reason: String },
}

/// Asynchronous callback for one dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub action_id: Uuid,
    pub appointment_id: Uuid,
    pub channel: Channel,
    pub outcome: DeliveryOutcome,
    pub reported_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatch timed out after {0}ms")]
    Timeout(u64),

    #[error("Dispatch rejected: {0}")]
    Rejected(String),

    #[error("Dispatch transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DispatchFailure
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::ExternalService(err.to_string())
    }
}
