use async_trait::async_trait;
use thiserror::Error;

use shared_models::{Appointment, Patient};

use crate::models::VerificationStatus;

#[derive(Debug, Error)]
#[error("Insurance verification failed: {0}")]
pub struct VerificationError(pub String);

/// Insurance verification collaborator. The engine never verifies coverage
/// itself; it only consumes the status.
#[async_trait]
pub trait InsuranceVerifier: Send + Sync {
    async fn verify(&self, patient: &Patient, appointment: &Appointment) -> Result<VerificationStatus, VerificationError>;
}

/// Reads the verification flag already recorded on the appointment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagVerifier;

#[async_trait]
impl InsuranceVerifier for FlagVerifier {
    async fn verify(&self, _patient: &Patient, appointment: &Appointment) -> Result<VerificationStatus, VerificationError> {
        Ok(if appointment.insurance_verified {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Pending
        })
    }
}
