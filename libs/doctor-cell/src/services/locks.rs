use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use shared_utils::run_with_timeout;

use crate::models::CalendarError;

/// Per-doctor critical sections. Bookings, status changes and schedule edits
/// for the same doctor queue up behind one mutex; different doctors never
/// contend. Clones share the same registry.
#[derive(Clone)]
pub struct DoctorLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    timeout_ms: u64,
}

/// Held for the duration of a check-then-commit. Dropping it releases the doctor.
pub type DoctorGuard = OwnedMutexGuard<()>;

impl DoctorLocks {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout_ms,
        }
    }

    pub async fn acquire(&self, doctor_id: Uuid) -> Result<DoctorGuard, CalendarError> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(doctor_id).or_default().clone()
        };

        run_with_timeout(self.timeout_ms, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!("Timed out waiting {}ms for doctor {} lock", self.timeout_ms, doctor_id);
                CalendarError::LockTimeout {
                    doctor_id,
                    timeout_ms: self.timeout_ms,
                }
            })
    }

    pub async fn tracked_doctors(&self) -> usize {
        self.locks.lock().await.len()
    }
}
