use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::appointment::AppointmentStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
    Phone,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Sms, Channel::Phone, Channel::Email];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Email => write!(f, "email"),
            Channel::Phone => write!(f, "phone"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" | "text" => Ok(Channel::Sms),
            "email" => Ok(Channel::Email),
            "phone" | "call" => Ok(Channel::Phone),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Finalized outcomes of a patient's past appointments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitHistory {
    pub completed: u32,
    pub no_shows: u32,
    pub cancelled: u32,
}

impl VisitHistory {
    pub fn total(&self) -> u32 {
        self.completed + self.no_shows + self.cancelled
    }

    /// Counts a finalized status; active statuses are ignored.
    pub fn record(&mut self, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Completed => self.completed += 1,
            AppointmentStatus::NoShow => self.no_shows += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
            AppointmentStatus::Requested | AppointmentStatus::Confirmed => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Preferred channels, most preferred first.
    pub channel_preferences: Vec<Channel>,
    pub history: VisitHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_high_risk(&self, no_show_threshold: u32) -> bool {
        self.history.no_shows >= no_show_threshold
    }
}
