use crate::{LocalStorage, Storage, StorageResult};
use courier_core::DownloadConfig;
use std::sync::Arc;

/// Create the durable attachment storage described by the configuration.
pub async fn create_storage(config: &DownloadConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage = LocalStorage::new(config.storage_path.clone()).await?;
    Ok(Arc::new(storage))
}
