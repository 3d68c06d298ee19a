//! Error types module
//!
//! `DownloadError` is the job-level taxonomy: whatever goes wrong inside the
//! fetch/decrypt/persist pipeline is reported to the caller as one of these.
//! Size-cap and header violations deliberately collapse into
//! [`DownloadError::DownloadFailed`] so callers cannot tell attack-shaped
//! failures from ordinary ones.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like invalid requests
    Debug,
    /// Warning level - for transient issues like network failures
    Warn,
    /// Error level - for integrity and storage failures
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Download failed")]
    DownloadFailed,

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown CDN number: {0}")]
    UnknownCdn(u32),
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

impl DownloadError {
    pub fn log_level(&self) -> LogLevel {
        match self {
            DownloadError::InvalidRequest(_) => LogLevel::Debug,
            DownloadError::Transport(_) | DownloadError::UnknownCdn(_) => LogLevel::Warn,
            DownloadError::DownloadFailed
            | DownloadError::Decrypt(_)
            | DownloadError::Storage(_)
            | DownloadError::Store(_) => LogLevel::Error,
        }
    }

    /// Whether a manual retry by re-enqueuing has a reasonable chance to succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DownloadError::Transport(_) | DownloadError::Storage(_) | DownloadError::Store(_)
        )
    }
}

impl From<io::Error> for DownloadError {
    fn from(err: io::Error) -> Self {
        DownloadError::Storage(format!("IO error: {}", err))
    }
}
