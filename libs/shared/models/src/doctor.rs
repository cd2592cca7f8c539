use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One contiguous block of bookable time on a given weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingWindow {
    pub fn new(weekday: Weekday, start: NaiveTime, end: NaiveTime) -> Self {
        Self { weekday, start, end }
    }

    /// Whether `[start, end)` lies entirely inside this window.
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start && end <= self.end && start < end
    }

    pub fn overlaps(&self, other: &WorkingWindow) -> bool {
        self.weekday == other.weekday && self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub display_name: String,
    pub specialty: String,
    pub working_hours: Vec<WorkingWindow>,
    pub slot_minutes: u32,
    pub capacity: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    /// Working windows for a weekday, ordered by start time.
    pub fn windows_for(&self, weekday: Weekday) -> Vec<&WorkingWindow> {
        let mut windows: Vec<&WorkingWindow> = self
            .working_hours
            .iter()
            .filter(|w| w.weekday == weekday)
            .collect();
        windows.sort_by_key(|w| w.start);
        windows
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.working_hours.iter().any(|w| w.weekday == weekday)
    }

    /// Checks the schedule-shaped invariants a doctor record must hold.
    pub fn validate_schedule(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.slot_minutes == 0 {
            issues.push("slot granularity must be positive".to_string());
        }
        if self.capacity == 0 {
            issues.push("capacity must be at least 1".to_string());
        }

        for (i, window) in self.working_hours.iter().enumerate() {
            if window.start >= window.end {
                issues.push(format!(
                    "{} window {}-{} must start before it ends",
                    window.weekday, window.start, window.end
                ));
            }
            for other in &self.working_hours[i + 1..] {
                if window.overlaps(other) {
                    issues.push(format!(
                        "{} windows {}-{} and {}-{} overlap",
                        window.weekday, window.start, window.end, other.start, other.end
                    ));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
