use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use shared_models::{Appointment, Doctor, WorkingWindow};

use crate::models::{AvailableSlot, SlotRejection};

/// Point-in-time view of one doctor's bookable time.
///
/// Holds the doctor's working hours plus the active appointments that were
/// loaded for the period of interest. Every answer is computed from this
/// snapshot alone, so it can be shared across readers without locking.
#[derive(Debug, Clone)]
pub struct DoctorCalendar {
    doctor: Doctor,
    active: Vec<Appointment>,
}

impl DoctorCalendar {
    /// Keeps only this doctor's `requested`/`confirmed` appointments.
    pub fn new(doctor: Doctor, appointments: impl IntoIterator<Item = Appointment>) -> Self {
        let mut active: Vec<Appointment> = appointments
            .into_iter()
            .filter(|a| a.doctor_id == doctor.id && a.is_active())
            .collect();
        active.sort_by_key(|a| a.start_time);
        Self { doctor, active }
    }

    /// Drops one appointment from the snapshot, e.g. the one being rescheduled.
    pub fn excluding(mut self, appointment_id: Uuid) -> Self {
        self.active.retain(|a| a.id != appointment_id);
        self
    }

    pub fn doctor(&self) -> &Doctor {
        &self.doctor
    }

    pub fn active_appointments(&self) -> &[Appointment] {
        &self.active
    }

    pub fn is_available(&self, start: DateTime<Utc>, duration_minutes: u32) -> bool {
        self.check(start, duration_minutes).is_ok()
    }

    /// Same decision as [`is_available`](Self::is_available), with the reason
    /// when the answer is no.
    pub fn check(&self, start: DateTime<Utc>, duration_minutes: u32) -> Result<(), SlotRejection> {
        if duration_minutes == 0 {
            return Err(SlotRejection::InvalidInterval);
        }
        if !self.doctor.is_active {
            return Err(SlotRejection::DoctorInactive);
        }

        let end = start
            .checked_add_signed(Duration::minutes(duration_minutes as i64))
            .ok_or(SlotRejection::InvalidInterval)?;
        if self.window_containing(start, end).is_none() {
            return Err(SlotRejection::OutsideWorkingHours);
        }
        if self.peak_load(start, end) >= self.doctor.capacity {
            return Err(SlotRejection::CapacityExceeded);
        }
        Ok(())
    }

    /// The single working window that fully contains `[start, end)`.
    /// Intervals crossing a window boundary or midnight have none.
    pub fn window_containing(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&WorkingWindow> {
        if end <= start || start.date_naive() != end.date_naive() {
            return None;
        }
        let weekday = start.weekday();
        self.doctor
            .working_hours
            .iter()
            .find(|w| w.weekday == weekday && w.contains(start.time(), end.time()))
    }

    /// Highest number of active appointments overlapping any instant of
    /// `[start, end)`.
    pub fn peak_load(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        let mut events: Vec<(DateTime<Utc>, i32)> = Vec::new();
        for appt in self.active.iter().filter(|a| a.overlaps(start, end)) {
            events.push((appt.start_time.max(start), 1));
            events.push((appt.end_time().min(end), -1));
        }
        // Ends sort before starts at the same instant: back-to-back is not overlap.
        events.sort_by_key(|(at, delta)| (*at, *delta));

        let mut current = 0i32;
        let mut peak = 0i32;
        for (_, delta) in events {
            current += delta;
            peak = peak.max(current);
        }
        peak.max(0) as u32
    }

    /// Bookable slots of the doctor's own granularity on `date`.
    pub fn available_slots(&self, date: NaiveDate) -> DaySlots<'_> {
        self.slots_of(date, self.doctor.slot_minutes)
    }

    /// Bookable slots of `duration_minutes`, starting on the granularity grid.
    pub fn slots_of(&self, date: NaiveDate, duration_minutes: u32) -> DaySlots<'_> {
        let mut windows: Vec<WorkingWindow> = self
            .doctor
            .windows_for(date.weekday())
            .into_iter()
            .cloned()
            .collect();
        windows.sort_by_key(|w| w.start);

        DaySlots {
            calendar: self,
            date,
            duration_minutes,
            windows,
            window_idx: 0,
            cursor: None,
        }
    }
}

/// Lazy walk over one day's working windows at the doctor's granularity.
///
/// Finite, and restartable via [`DaySlots::restart`] or by cloning before
/// iterating.
#[derive(Debug, Clone)]
pub struct DaySlots<'a> {
    calendar: &'a DoctorCalendar,
    date: NaiveDate,
    duration_minutes: u32,
    windows: Vec<WorkingWindow>,
    window_idx: usize,
    cursor: Option<DateTime<Utc>>,
}

impl DaySlots<'_> {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn restart(&mut self) {
        self.window_idx = 0;
        self.cursor = None;
    }

    fn at(&self, time: NaiveTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(time))
    }
}

impl Iterator for DaySlots<'_> {
    type Item = AvailableSlot;

    fn next(&mut self) -> Option<Self::Item> {
        let step_minutes = self.calendar.doctor.slot_minutes;
        if step_minutes == 0 || self.duration_minutes == 0 {
            return None;
        }
        let step = Duration::minutes(step_minutes as i64);
        let length = Duration::minutes(self.duration_minutes as i64);

        while let Some(window) = self.windows.get(self.window_idx) {
            let window_end = self.at(window.end);
            let start = self.cursor.unwrap_or_else(|| self.at(window.start));

            let end = match start.checked_add_signed(length) {
                Some(end) if end <= window_end => end,
                _ => {
                    self.window_idx += 1;
                    self.cursor = None;
                    continue;
                }
            };

            match start.checked_add_signed(step) {
                Some(next) => self.cursor = Some(next),
                None => {
                    self.window_idx += 1;
                    self.cursor = None;
                }
            }
            if self.calendar.is_available(start, self.duration_minutes) {
                return Some(AvailableSlot {
                    start_time: start,
                    end_time: end,
                    duration_minutes: self.duration_minutes,
                });
            }
        }
        None
    }
}
