//! Single-slot decrypt pipeline.
//!
//! Fetches run four at a time but only one ciphertext is decrypted and held in
//! memory at once. The slot is held from reading the ciphertext until its
//! plaintext has been handed to durable storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use courier_core::models::{AttachmentPointer, AttachmentStream};
use courier_core::{AttachmentCipher, DownloadError, DownloadResult};
use courier_storage::{attachment_storage_key, delete_if_exists, Storage};
use tokio::fs;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct DecryptPipeline {
    slot: Arc<Semaphore>,
    storage: Arc<dyn Storage>,
}

impl DecryptPipeline {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Decrypt the ciphertext at `ciphertext_path` and store the plaintext.
    ///
    /// The ciphertext file is deleted whatever the outcome.
    #[tracing::instrument(skip_all, fields(attachment.id = %pointer.id))]
    pub async fn run(
        &self,
        pointer: &AttachmentPointer,
        ciphertext_path: PathBuf,
    ) -> DownloadResult<AttachmentStream> {
        let result = self.decrypt_and_store(pointer, &ciphertext_path).await;

        if let Err(e) = delete_if_exists(&ciphertext_path).await {
            tracing::warn!(
                error = %e,
                path = %ciphertext_path.display(),
                "Failed to delete ciphertext temp file"
            );
        }

        result
    }

    async fn decrypt_and_store(
        &self,
        pointer: &AttachmentPointer,
        ciphertext_path: &Path,
    ) -> DownloadResult<AttachmentStream> {
        let _slot = self
            .slot
            .acquire()
            .await
            .map_err(|_| DownloadError::Decrypt("Decrypt pipeline closed".to_string()))?;

        let ciphertext = fs::read(ciphertext_path).await?;
        let key = pointer.encryption_key.clone();
        let digest = pointer.digest.clone();
        let byte_count = pointer.byte_count;

        let plaintext = tokio::task::spawn_blocking(move || {
            AttachmentCipher::decrypt(&ciphertext, &key, &digest, byte_count)
        })
        .await
        .map_err(|e| DownloadError::Decrypt(format!("Decrypt task failed: {}", e)))??;

        let storage_key = attachment_storage_key(&pointer.id);
        let location = self.storage.write(&storage_key, plaintext).await?;

        tracing::info!(
            storage_key = %storage_key,
            location = %location,
            size_bytes = byte_count,
            "Attachment decrypted and stored"
        );

        Ok(AttachmentStream::from_pointer(pointer, storage_key))
    }
}
