use courier_core::DownloadError;
use thiserror::Error;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DownloadError {
    fn from(err: StoreError) -> Self {
        DownloadError::Store(err.to_string())
    }
}
