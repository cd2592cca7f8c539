use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::SchedulingConfig;
use shared_database::{with_timeout, ClinicStore};
use shared_models::Appointment;

use crate::models::{AvailableSlot, CalendarError};
use crate::services::calendar::DoctorCalendar;

/// Read side of the calendar: loads snapshots from the store without taking
/// any doctor lock. Results may be stale; booking rechecks before committing.
///
/// Slot listings apply the same interval rules as booking, so a listed slot
/// is one `book` would accept.
#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn ClinicStore>,
    timeout_ms: u64,
    rules: SchedulingConfig,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn ClinicStore>, timeout_ms: u64, rules: SchedulingConfig) -> Self {
        Self {
            store,
            timeout_ms,
            rules,
        }
    }

    /// Earliest start a booking made at `now` may have.
    pub fn not_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (!self.rules.allow_past_bookings).then_some(now)
    }

    /// Snapshot covering `[from, to)`.
    #[instrument(skip(self))]
    pub async fn calendar_for(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<DoctorCalendar, CalendarError> {
        let doctor = with_timeout(self.timeout_ms, self.store.get_doctor(doctor_id))
            .await?
            .ok_or(CalendarError::DoctorNotFound(doctor_id))?;

        let appointments = with_timeout(
            self.timeout_ms,
            self.store.appointments_for_doctor(doctor_id, from, to),
        )
        .await?;

        debug!("Loaded {} appointments for doctor {}", appointments.len(), doctor_id);
        Ok(DoctorCalendar::new(doctor, appointments))
    }

    /// Snapshot covering the whole of `first` through `last` inclusive.
    pub async fn calendar_for_days(
        &self,
        doctor_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<DoctorCalendar, CalendarError> {
        let (from, _) = day_bounds(first);
        let (_, to) = day_bounds(last);
        self.calendar_for(doctor_id, from, to).await
    }

    /// Slots on `date` that a booking made at `now` could take.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        duration_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlot>, CalendarError> {
        if let Some(duration) = duration_minutes {
            self.check_duration(duration)?;
        }

        let calendar = self.calendar_for_days(doctor_id, date, date).await?;
        let duration = duration_minutes.unwrap_or(calendar.doctor().slot_minutes);
        self.check_duration(duration)?;

        let not_before = self.not_before(now);
        Ok(calendar
            .slots_of(date, duration)
            .filter(|slot| not_before.map_or(true, |t| slot.start_time >= t))
            .collect())
    }

    fn check_duration(&self, duration_minutes: u32) -> Result<(), CalendarError> {
        if duration_minutes == 0 {
            return Err(CalendarError::InvalidInterval("duration must be positive".to_string()));
        }
        if duration_minutes > self.rules.max_duration_minutes {
            return Err(CalendarError::InvalidInterval(format!(
                "duration {} exceeds the {} minute maximum",
                duration_minutes, self.rules.max_duration_minutes
            )));
        }
        Ok(())
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<bool, CalendarError> {
        let end = interval_end(start, duration_minutes)?;
        let calendar = self.calendar_for(doctor_id, start, end).await?;
        Ok(calendar.is_available(start, duration_minutes))
    }

    /// Every appointment of the doctor on `date`, any status.
    pub async fn doctor_day(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, CalendarError> {
        let (from, to) = day_bounds(date);
        let appointments = with_timeout(
            self.timeout_ms,
            self.store.appointments_for_doctor(doctor_id, from, to),
        )
        .await?;
        Ok(appointments
            .into_iter()
            .filter(|a| a.start_time.date_naive() == date)
            .collect())
    }
}

/// End of `[start, start + duration)`, or `InvalidInterval` when it is not
/// representable.
pub fn interval_end(start: DateTime<Utc>, duration_minutes: u32) -> Result<DateTime<Utc>, CalendarError> {
    start
        .checked_add_signed(Duration::minutes(duration_minutes as i64))
        .ok_or_else(|| CalendarError::InvalidInterval("interval ends past the supported time range".to_string()))
}

/// UTC `[00:00, next 00:00)` of a date. The last representable day ends at
/// the maximum instant.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    let end = start
        .checked_add_signed(Duration::days(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}
