use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::models::{AttachmentId, AttachmentPointer};
use courier_core::{DownloadError, DownloadResult};
use courier_fetch::{AttachmentFetcher, ProgressCallback};
use courier_storage::TempFiles;
use tokio::sync::Semaphore;

/// What the fake CDN serves for an attachment.
#[derive(Clone)]
pub enum FakeBlob {
    Ciphertext(Vec<u8>),
    Fail(DownloadError),
}

/// Where a held fetch parks until the test releases it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Never,
    /// After reporting 0.5 then 0.25.
    AfterProgress,
    /// Before reporting anything.
    BeforeProgress,
}

/// In-process fetcher.
pub struct FakeFetcher {
    temp: TempFiles,
    blobs: Mutex<HashMap<AttachmentId, FakeBlob>>,
    hold_at: Hold,
    hold: Arc<Semaphore>,
    started: Mutex<Vec<AttachmentId>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(temp: TempFiles, hold_at: Hold) -> Self {
        Self {
            temp,
            blobs: Mutex::new(HashMap::new()),
            hold_at,
            hold: Arc::new(Semaphore::new(0)),
            started: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn serve(&self, id: &AttachmentId, blob: FakeBlob) {
        self.blobs.lock().unwrap().insert(id.clone(), blob);
    }

    /// Let `n` held fetches finish.
    pub fn release(&self, n: usize) {
        self.hold.add_permits(n);
    }

    async fn wait_for_release(&self, at: Hold) {
        if self.hold_at == at {
            self.hold.acquire().await.unwrap().forget();
        }
    }

    pub fn started(&self) -> Vec<AttachmentId> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_count(&self, id: &str) -> usize {
        self.started()
            .iter()
            .filter(|started| started.as_str() == id)
            .count()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentFetcher for FakeFetcher {
    async fn fetch(
        &self,
        pointer: &AttachmentPointer,
        on_progress: ProgressCallback,
    ) -> DownloadResult<PathBuf> {
        self.started.lock().unwrap().push(pointer.id.clone());
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        self.wait_for_release(Hold::BeforeProgress).await;
        on_progress(0.5);
        on_progress(0.25);
        self.wait_for_release(Hold::AfterProgress).await;
        on_progress(1.0);
        self.active.fetch_sub(1, Ordering::SeqCst);

        let blob = self.blobs.lock().unwrap().get(&pointer.id).cloned();
        match blob {
            Some(FakeBlob::Ciphertext(bytes)) => {
                let file = self.temp.allocate();
                tokio::fs::write(file.path(), bytes).await?;
                Ok(file.into_path())
            }
            Some(FakeBlob::Fail(error)) => Err(error),
            None => Err(DownloadError::Transport("unexpected status 404".to_string())),
        }
    }
}
