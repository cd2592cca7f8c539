// libs/appointment-cell/tests/booking_test.rs
//
// Conflict resolution against a single doctor's calendar.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use appointment_cell::{
    AppointmentError, BookAppointmentRequest, ConflictResolver, RescheduleAppointmentRequest,
};
use shared_config::SchedulingConfig;
use shared_database::{ClinicStore, InMemoryStore};
use shared_models::error::{AppError, ErrorKind};
use shared_models::{AppointmentStatus, AppointmentType, Doctor, Patient};
use shared_utils::test_utils::{at, reference_monday, TestDoctor, TestPatient};

struct Fixture {
    store: Arc<InMemoryStore>,
    resolver: ConflictResolver,
    doctor: Doctor,
    patient: Patient,
    now: DateTime<Utc>,
}

async fn fixture(doctor: Doctor) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let patient = TestPatient::new_patient();
    store.put_doctor(&doctor).await.unwrap();
    store.put_patient(&patient).await.unwrap();

    let config = SchedulingConfig {
        lock_timeout_ms: 500,
        ..SchedulingConfig::default()
    };
    Fixture {
        resolver: ConflictResolver::new(store.clone(), config, 200),
        store,
        doctor,
        patient,
        now: at(reference_monday(), 7, 0),
    }
}

fn request(f: &Fixture, start: DateTime<Utc>, minutes: u32) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id: f.doctor.id,
        patient_id: f.patient.id,
        start_time: start,
        duration_minutes: minutes,
        appointment_type: AppointmentType::GeneralConsultation,
        notes: None,
        insurance_verified: true,
    }
}

fn starts(err: &AppointmentError) -> Vec<DateTime<Utc>> {
    err.alternatives().iter().map(|s| s.start_time).collect()
}

// ==============================================================================
// BOOK
// ==============================================================================

#[tokio::test]
async fn occupied_slot_offers_nearest_alternatives() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();

    let first = f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap();
    assert_eq!(first.status, AppointmentStatus::Requested);
    assert_eq!(first.end_time(), at(day, 9, 15));

    let err = f.resolver.book(request(&f, at(day, 9, 0), 10), f.now).await.unwrap_err();
    assert_matches!(err, AppointmentError::CapacityExceeded { .. });
    assert_eq!(err.kind(), ErrorKind::SlotUnavailable);
    assert_eq!(starts(&err), vec![at(day, 9, 15), at(day, 9, 30), at(day, 9, 45)]);
}

#[tokio::test]
async fn slot_conflict_response_carries_alternatives() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap();

    let err = f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap_err();
    match AppError::from(err) {
        AppError::SlotUnavailable { alternatives, .. } => {
            assert_eq!(alternatives.as_array().map(|a| a.len()), Some(3));
        }
        other => panic!("expected slot unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn request_crossing_window_end_is_rejected_wholesale() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();

    let err = f.resolver.book(request(&f, at(day, 9, 50), 15), f.now).await.unwrap_err();
    assert_matches!(err, AppointmentError::SlotOutsideWorkingHours { .. });
    assert_eq!(starts(&err)[0], at(day, 9, 45));
    assert_eq!(f.store.appointment_count().await, 0);
}

#[tokio::test]
async fn day_without_hours_suggests_next_working_day() {
    let f = fixture(TestDoctor::single_window()).await;
    let tuesday = reference_monday() + Duration::days(1);

    let err = f.resolver.book(request(&f, at(tuesday, 9, 0), 15), f.now).await.unwrap_err();
    assert_matches!(err, AppointmentError::SlotOutsideWorkingHours { .. });
    let next_monday = reference_monday() + Duration::days(7);
    assert_eq!(starts(&err), vec![at(next_monday, 9, 0), at(next_monday, 9, 15), at(next_monday, 9, 30)]);
}

#[tokio::test]
async fn malformed_interval_is_rejected_before_storage() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    f.store.set_available(false).await;

    assert_matches!(
        f.resolver.book(request(&f, at(day, 9, 0), 0), f.now).await,
        Err(AppointmentError::InvalidInterval(_))
    );
    assert_matches!(
        f.resolver.book(request(&f, at(day, 6, 0), 15), f.now).await,
        Err(AppointmentError::InvalidInterval(_))
    );
    assert_matches!(
        f.resolver.book(request(&f, at(day, 9, 0), 600), f.now).await,
        Err(AppointmentError::InvalidInterval(_))
    );
}

#[tokio::test]
async fn listed_slots_after_now_all_book() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    let now = at(day, 9, 20);

    let slots = f
        .resolver
        .availability()
        .available_slots(f.doctor.id, day, None, now)
        .await
        .unwrap();
    let listed: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(listed, vec![at(day, 9, 30), at(day, 9, 45)]);

    for slot in slots {
        let booked = f
            .resolver
            .book(request(&f, slot.start_time, slot.duration_minutes), now)
            .await;
        assert!(booked.is_ok(), "listed slot {} should book", slot.start_time);
    }
}

#[tokio::test]
async fn interval_near_end_of_time_is_rejected_without_panicking() {
    let f = fixture(TestDoctor::single_window()).await;
    let max = DateTime::<Utc>::MAX_UTC;

    assert_matches!(
        f.resolver.book(request(&f, max - Duration::minutes(5), 30), f.now).await,
        Err(AppointmentError::InvalidInterval(_))
    );
    assert_matches!(
        f.resolver.book(request(&f, max - Duration::minutes(60), 30), f.now).await,
        Err(AppointmentError::SlotOutsideWorkingHours { .. })
    );
}

#[tokio::test]
async fn inactive_doctor_cannot_be_booked() {
    let mut doctor = TestDoctor::single_window();
    doctor.is_active = false;
    let f = fixture(doctor).await;

    let err = f
        .resolver
        .book(request(&f, at(reference_monday(), 9, 0), 15), f.now)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::DoctorInactive(id) if id == f.doctor.id);
    assert!(err.alternatives().is_empty());
}

#[tokio::test]
async fn unknown_doctor_and_patient_are_not_found() {
    let f = fixture(TestDoctor::single_window()).await;
    let start = at(reference_monday(), 9, 0);

    let mut unknown_doctor = request(&f, start, 15);
    unknown_doctor.doctor_id = Uuid::new_v4();
    assert_matches!(
        f.resolver.book(unknown_doctor, f.now).await,
        Err(AppointmentError::DoctorNotFound(_))
    );

    let mut unknown_patient = request(&f, start, 15);
    unknown_patient.patient_id = Uuid::new_v4();
    let err = f.resolver.book(unknown_patient, f.now).await.unwrap_err();
    assert_matches!(err, AppointmentError::PatientNotFound(_));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn capacity_two_accepts_two_overlapping_bookings() {
    let doctor = TestDoctor::with_windows(TestDoctor::single_window().working_hours, 15, 2);
    let f = fixture(doctor).await;
    let start = at(reference_monday(), 9, 0);

    f.resolver.book(request(&f, start, 30), f.now).await.unwrap();
    f.resolver.book(request(&f, start + Duration::minutes(15), 15), f.now).await.unwrap();
    assert_matches!(
        f.resolver.book(request(&f, start + Duration::minutes(20), 10), f.now).await,
        Err(AppointmentError::CapacityExceeded { .. })
    );
}

// ==============================================================================
// STORAGE FAILURES
// ==============================================================================

#[tokio::test]
async fn storage_outage_fails_closed() {
    let f = fixture(TestDoctor::single_window()).await;
    f.store.set_available(false).await;

    let err = f
        .resolver
        .book(request(&f, at(reference_monday(), 9, 0), 15), f.now)
        .await
        .unwrap_err();
    assert_matches!(err, AppointmentError::Storage(_));
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    f.store.set_available(true).await;
    assert_eq!(f.store.appointment_count().await, 0);
}

#[tokio::test]
async fn slow_storage_times_out_instead_of_hanging() {
    let f = fixture(TestDoctor::single_window()).await;
    f.store.set_latency(Some(StdDuration::from_millis(400))).await;

    let err = f
        .resolver
        .book(request(&f, at(reference_monday(), 9, 0), 15), f.now)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
}

// ==============================================================================
// CANCEL / LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn cancellation_is_idempotent_and_frees_capacity() {
    let f = fixture(TestDoctor::single_window()).await;
    let start = at(reference_monday(), 9, 0);
    let booked = f.resolver.book(request(&f, start, 15), f.now).await.unwrap();

    let first = f.resolver.cancel(booked.id, Some("patient called"), f.now).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.appointment.status, AppointmentStatus::Cancelled);
    assert!(first.appointment.notes.contains("patient called"));

    let second = f.resolver.cancel(booked.id, None, f.now).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.appointment.status, AppointmentStatus::Cancelled);

    let rebooked = f.resolver.book(request(&f, start, 15), f.now).await.unwrap();
    assert_ne!(rebooked.id, booked.id);
}

#[tokio::test]
async fn finished_appointments_cannot_be_cancelled() {
    let f = fixture(TestDoctor::single_window()).await;
    let booked = f
        .resolver
        .book(request(&f, at(reference_monday(), 9, 0), 15), f.now)
        .await
        .unwrap();

    f.resolver
        .transition(booked.id, AppointmentStatus::Completed, None, f.now)
        .await
        .unwrap();
    let err = f.resolver.cancel(booked.id, None, f.now).await.unwrap_err();
    assert_matches!(
        err,
        AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled
        }
    );
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn cancelling_unknown_appointment_is_not_found() {
    let f = fixture(TestDoctor::single_window()).await;
    assert_matches!(
        f.resolver.cancel(Uuid::new_v4(), None, f.now).await,
        Err(AppointmentError::AppointmentNotFound(_))
    );
}

// ==============================================================================
// RESCHEDULE
// ==============================================================================

#[tokio::test]
async fn reschedule_cancels_and_links_replacement() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    let original = f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap();

    let (cancelled, replacement) = f
        .resolver
        .reschedule(
            original.id,
            RescheduleAppointmentRequest {
                new_start_time: at(day, 9, 30),
                duration_minutes: None,
                reason: Some("clash at work".to_string()),
            },
            f.now,
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(replacement.rescheduled_from, Some(original.id));
    assert_eq!(replacement.start_time, at(day, 9, 30));
    assert_eq!(replacement.duration_minutes, 15);

    let stored = f.store.get_appointment(original.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
    // The freed slot is bookable again.
    f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap();
}

#[tokio::test]
async fn reschedule_may_overlap_its_own_old_slot() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    let original = f.resolver.book(request(&f, at(day, 9, 0), 30), f.now).await.unwrap();

    let (_, replacement) = f
        .resolver
        .reschedule(
            original.id,
            RescheduleAppointmentRequest {
                new_start_time: at(day, 9, 15),
                duration_minutes: Some(30),
                reason: None,
            },
            f.now,
        )
        .await
        .unwrap();
    assert_eq!(replacement.start_time, at(day, 9, 15));
}

#[tokio::test]
async fn rejected_reschedule_leaves_original_untouched() {
    let f = fixture(TestDoctor::single_window()).await;
    let day = reference_monday();
    let original = f.resolver.book(request(&f, at(day, 9, 0), 15), f.now).await.unwrap();
    f.resolver.book(request(&f, at(day, 9, 30), 15), f.now).await.unwrap();

    let err = f
        .resolver
        .reschedule(
            original.id,
            RescheduleAppointmentRequest {
                new_start_time: at(day, 9, 30),
                duration_minutes: None,
                reason: None,
            },
            f.now,
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::CapacityExceeded { .. });
    // The original's own slot counts as free when suggesting alternatives.
    assert!(starts(&err).contains(&at(day, 9, 0)));
    let stored = f.store.get_appointment(original.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Requested);
}
