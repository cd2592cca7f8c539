// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::AppointmentStatus;

use crate::models::AppointmentError;

/// Statuses reachable in one step. Transitions only ever move forward;
/// `cancelled`, `completed` and `no_show` are final.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Requested => &[
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::Confirmed => &[
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow => &[],
    }
}

/// `Ok(false)` when the appointment is already in `target` (a repeated
/// request is a no-op), `Ok(true)` when the move is allowed.
pub fn validate_transition(current: AppointmentStatus, target: AppointmentStatus) -> Result<bool, AppointmentError> {
    if current == target {
        debug!("Appointment already {}, nothing to do", target);
        return Ok(false);
    }
    if !valid_transitions(current).contains(&target) {
        warn!("Invalid status transition attempted: {} -> {}", current, target);
        return Err(AppointmentError::InvalidStatusTransition {
            from: current,
            to: target,
        });
    }
    Ok(true)
}

/// Whether the outcome counts towards the patient's visit history.
pub fn records_outcome(status: AppointmentStatus) -> bool {
    matches!(
        status,
        AppointmentStatus::Completed | AppointmentStatus::NoShow | AppointmentStatus::Cancelled
    )
}
