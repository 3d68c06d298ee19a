use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::models::AttachmentId;
use courier_storage::{attachment_key_prefix, LocalStorage, Storage, StorageResult};

/// Local storage that records how many writes overlap and which keys are live.
pub struct RecordingStorage {
    inner: LocalStorage,
    writing: AtomicUsize,
    max_writing: AtomicUsize,
    live: Mutex<BTreeSet<String>>,
}

impl RecordingStorage {
    pub fn new(inner: LocalStorage) -> Self {
        Self {
            inner,
            writing: AtomicUsize::new(0),
            max_writing: AtomicUsize::new(0),
            live: Mutex::new(BTreeSet::new()),
        }
    }

    /// Keys of downloaded plaintext for `id` that are currently stored.
    pub fn download_keys(&self, id: &str) -> Vec<String> {
        let prefix = format!("{}.", attachment_key_prefix(&AttachmentId::new(id)));
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_writing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn write(&self, storage_key: &str, data: Vec<u8>) -> StorageResult<String> {
        let writing = self.writing.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writing.fetch_max(writing, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = self.inner.write(storage_key, data).await;
        self.writing.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.live.lock().unwrap().insert(storage_key.to_string());
        }
        result
    }

    async fn read(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.inner.read(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await?;
        self.live.lock().unwrap().remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        self.inner.content_length(storage_key).await
    }

    fn location(&self, storage_key: &str) -> StorageResult<String> {
        self.inner.location(storage_key)
    }
}
