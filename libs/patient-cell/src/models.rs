use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use shared_database::StorageError;
use shared_models::error::{AppError, ErrorKind};
use shared_models::Channel;

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub channel_preferences: Vec<Channel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub channel_preferences: Option<Vec<Channel>>,
}

#[derive(Debug, Error)]
pub enum PatientError {
    #[error("Patient {0} not found")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PatientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatientError::NotFound(_) => ErrorKind::NotFound,
            PatientError::ValidationError(_) => ErrorKind::InvalidInterval,
            PatientError::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(_) => AppError::NotFound(err.to_string()),
            PatientError::ValidationError(msg) => AppError::ValidationError(msg),
            PatientError::Storage(e) => e.into(),
        }
    }
}
