//! Storage abstraction trait
//!
//! This module defines the Storage trait that durable attachment backends implement.

use async_trait::async_trait;
use courier_core::DownloadError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for DownloadError {
    fn from(err: StorageError) -> Self {
        DownloadError::Storage(err.to_string())
    }
}

/// Durable storage for decrypted attachments.
///
/// The decrypt pipeline writes plaintext through this trait; the scheduler
/// deletes through it when a download turns out to be orphaned.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `storage_key`, replacing any previous content, and
    /// return the location of the stored file.
    async fn write(&self, storage_key: &str, data: Vec<u8>) -> StorageResult<String>;

    /// Read a file by its storage key
    async fn read(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a file by its storage key. Missing files are not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Get the size in bytes of a stored file.
    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    /// Location (local path or URL) a storage key resolves to.
    fn location(&self, storage_key: &str) -> StorageResult<String>;
}
