// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{interval_end, AvailabilityService, AvailableSlot, DoctorLocks, SlotRejection};
use shared_config::SchedulingConfig;
use shared_database::{with_timeout, ClinicStore};
use shared_models::{Appointment, AppointmentStatus};

use crate::models::{AppointmentError, BookAppointmentRequest, RescheduleAppointmentRequest, StatusChange};
use crate::services::alternatives::nearest_alternatives;
use crate::services::lifecycle::validate_transition;

/// The write side of the calendar.
///
/// Every change to an appointment's status or time goes through here, under
/// the owning doctor's lock, and is rechecked against a fresh snapshot before
/// it is committed. Alternatives are computed after the lock is released.
#[derive(Clone)]
pub struct ConflictResolver {
    store: Arc<dyn ClinicStore>,
    availability: AvailabilityService,
    locks: DoctorLocks,
    config: SchedulingConfig,
    storage_timeout_ms: u64,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn ClinicStore>, config: SchedulingConfig, storage_timeout_ms: u64) -> Self {
        let locks = DoctorLocks::new(config.lock_timeout_ms);
        Self::with_locks(store, config, storage_timeout_ms, locks)
    }

    /// Shares `locks` with other writers of the same doctors' calendars.
    pub fn with_locks(
        store: Arc<dyn ClinicStore>,
        config: SchedulingConfig,
        storage_timeout_ms: u64,
        locks: DoctorLocks,
    ) -> Self {
        Self {
            availability: AvailabilityService::new(Arc::clone(&store), storage_timeout_ms, config.clone()),
            locks,
            store,
            config,
            storage_timeout_ms,
        }
    }

    pub fn locks(&self) -> &DoctorLocks {
        &self.locks
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        with_timeout(self.storage_timeout_ms, self.store.get_appointment(appointment_id))
            .await?
            .ok_or(AppointmentError::AppointmentNotFound(appointment_id))
    }

    /// Rejects malformed intervals before any calendar is loaded and returns
    /// the interval's end.
    pub fn validate_interval(
        &self,
        start: DateTime<Utc>,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppointmentError> {
        if duration_minutes == 0 {
            return Err(AppointmentError::InvalidInterval("duration must be positive".to_string()));
        }
        if duration_minutes > self.config.max_duration_minutes {
            return Err(AppointmentError::InvalidInterval(format!(
                "duration {} exceeds the {} minute maximum",
                duration_minutes, self.config.max_duration_minutes
            )));
        }
        if !self.config.allow_past_bookings && start < now {
            return Err(AppointmentError::InvalidInterval("start time is in the past".to_string()));
        }
        Ok(interval_end(start, duration_minutes)?)
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn book(&self, request: BookAppointmentRequest, now: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
        let end = self.validate_interval(request.start_time, request.duration_minutes, now)?;

        with_timeout(self.storage_timeout_ms, self.store.get_patient(request.patient_id))
            .await?
            .ok_or(AppointmentError::PatientNotFound(request.patient_id))?;

        let guard = self.locks.acquire(request.doctor_id).await?;

        let calendar = self
            .availability
            .calendar_for(request.doctor_id, request.start_time, end)
            .await?;

        if let Err(rejection) = calendar.check(request.start_time, request.duration_minutes) {
            drop(guard);
            debug!("Booking for doctor {} at {} rejected: {:?}", request.doctor_id, request.start_time, rejection);
            return Err(self
                .rejection(rejection, request.doctor_id, request.start_time, request.duration_minutes, None, now)
                .await);
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Requested,
            appointment_type: request.appointment_type,
            notes: request.notes.unwrap_or_default(),
            insurance_verified: request.insurance_verified,
            rescheduled_from: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = with_timeout(self.storage_timeout_ms, self.store.put_appointment(&appointment)).await {
            error!("Failed to persist appointment for doctor {}: {}", appointment.doctor_id, e);
            return Err(e.into());
        }
        drop(guard);

        info!(
            "Appointment {} booked with doctor {} at {}",
            appointment.id, appointment.doctor_id, appointment.start_time
        );
        Ok(appointment)
    }

    /// Idempotent: cancelling a cancelled appointment succeeds without change.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, AppointmentError> {
        let note = reason.map(|r| format!("Cancelled: {}", r));
        self.transition(appointment_id, AppointmentStatus::Cancelled, note.as_deref(), now)
            .await
    }

    /// Moves an appointment forward to `target` under the doctor's lock.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, AppointmentError> {
        let current = self.get(appointment_id).await?;
        if !validate_transition(current.status, target)? {
            return Ok(StatusChange {
                appointment: current,
                changed: false,
            });
        }

        let _guard = self.locks.acquire(current.doctor_id).await?;
        let mut appointment = self.get(appointment_id).await?;
        if !validate_transition(appointment.status, target)? {
            return Ok(StatusChange {
                appointment,
                changed: false,
            });
        }

        let previous = appointment.status;
        appointment.status = target;
        appointment.updated_at = now;
        if let Some(note) = note {
            appointment.append_note(note);
        }
        with_timeout(self.storage_timeout_ms, self.store.put_appointment(&appointment)).await?;

        info!("Appointment {} moved {} -> {}", appointment.id, previous, target);
        Ok(StatusChange {
            appointment,
            changed: true,
        })
    }

    /// Cancel and rebook under one critical section. The old appointment's
    /// own capacity does not count against the new interval. Returns the
    /// cancelled appointment and its replacement.
    #[instrument(skip(self, request))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<(Appointment, Appointment), AppointmentError> {
        let original = self.get(appointment_id).await?;
        ensure_active(&original)?;

        let duration = request.duration_minutes.unwrap_or(original.duration_minutes);
        let end = self.validate_interval(request.new_start_time, duration, now)?;

        let guard = self.locks.acquire(original.doctor_id).await?;
        let original = self.get(appointment_id).await?;
        ensure_active(&original)?;

        let calendar = self
            .availability
            .calendar_for(original.doctor_id, request.new_start_time, end)
            .await?
            .excluding(original.id);

        if let Err(rejection) = calendar.check(request.new_start_time, duration) {
            drop(guard);
            return Err(self
                .rejection(
                    rejection,
                    original.doctor_id,
                    request.new_start_time,
                    duration,
                    Some(original.id),
                    now,
                )
                .await);
        }

        let mut cancelled = original.clone();
        cancelled.status = AppointmentStatus::Cancelled;
        cancelled.updated_at = now;
        cancelled.append_note(&match &request.reason {
            Some(reason) => format!("Rescheduled to {}: {}", request.new_start_time, reason),
            None => format!("Rescheduled to {}", request.new_start_time),
        });

        let replacement = Appointment {
            id: Uuid::new_v4(),
            start_time: request.new_start_time,
            duration_minutes: duration,
            status: AppointmentStatus::Requested,
            notes: String::new(),
            rescheduled_from: Some(original.id),
            created_at: now,
            updated_at: now,
            ..original.clone()
        };

        with_timeout(self.storage_timeout_ms, self.store.put_appointment(&cancelled)).await?;
        if let Err(e) = with_timeout(self.storage_timeout_ms, self.store.put_appointment(&replacement)).await {
            error!("Failed to persist rescheduled appointment for {}: {}", original.id, e);
            if let Err(restore) = with_timeout(self.storage_timeout_ms, self.store.put_appointment(&original)).await {
                error!("Failed to restore appointment {} after reschedule failure: {}", original.id, restore);
            }
            return Err(e.into());
        }
        drop(guard);

        info!(
            "Appointment {} rescheduled to {} as {}",
            original.id, replacement.start_time, replacement.id
        );
        Ok((cancelled, replacement))
    }

    /// Nearest bookable slots from a lock-free snapshot. Lookup failures are
    /// logged and yield no suggestions rather than masking the conflict.
    pub async fn alternatives_for(
        &self,
        doctor_id: Uuid,
        requested_start: DateTime<Utc>,
        duration_minutes: u32,
        excluding: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Vec<AvailableSlot> {
        let first = requested_start.date_naive();
        let last = first
            .checked_add_signed(Duration::days(self.config.alternative_search_days as i64))
            .unwrap_or(NaiveDate::MAX);

        let calendar = match self.availability.calendar_for_days(doctor_id, first, last).await {
            Ok(calendar) => calendar,
            Err(e) => {
                warn!("Could not load alternatives for doctor {}: {}", doctor_id, e);
                return Vec::new();
            }
        };
        let calendar = match excluding {
            Some(id) => calendar.excluding(id),
            None => calendar,
        };

        let not_before = self.availability.not_before(now);
        nearest_alternatives(&calendar, requested_start, duration_minutes, not_before, &self.config)
    }

    async fn rejection(
        &self,
        rejection: SlotRejection,
        doctor_id: Uuid,
        requested_start: DateTime<Utc>,
        duration_minutes: u32,
        excluding: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppointmentError {
        match rejection {
            SlotRejection::InvalidInterval => {
                AppointmentError::InvalidInterval("interval is empty or out of range".to_string())
            }
            SlotRejection::DoctorInactive => AppointmentError::DoctorInactive(doctor_id),
            SlotRejection::OutsideWorkingHours => AppointmentError::SlotOutsideWorkingHours {
                alternatives: self
                    .alternatives_for(doctor_id, requested_start, duration_minutes, excluding, now)
                    .await,
            },
            SlotRejection::CapacityExceeded => AppointmentError::CapacityExceeded {
                alternatives: self
                    .alternatives_for(doctor_id, requested_start, duration_minutes, excluding, now)
                    .await,
            },
        }
    }
}

fn ensure_active(appointment: &Appointment) -> Result<(), AppointmentError> {
    if appointment.is_active() {
        Ok(())
    } else {
        Err(AppointmentError::InvalidStatusTransition {
            from: appointment.status,
            to: AppointmentStatus::Cancelled,
        })
    }
}
