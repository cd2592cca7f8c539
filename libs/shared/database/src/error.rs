use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Whether the failure means the backend could not be reached at all,
    /// as opposed to rejecting a well-formed request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Unavailable(format!("request timed out: {}", err))
        } else if err.is_connect() {
            StorageError::Unavailable(format!("connection failed: {}", err))
        } else if err.is_decode() {
            StorageError::Serialization(err.to_string())
        } else {
            StorageError::Query(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for shared_models::error::AppError {
    fn from(err: StorageError) -> Self {
        use shared_models::error::AppError;
        match err {
            StorageError::Unavailable(_) | StorageError::Timeout(_) => AppError::ServiceUnavailable(err.to_string()),
            StorageError::Query(_) | StorageError::Serialization(_) | StorageError::Configuration(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
